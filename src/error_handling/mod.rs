//! Error handling and run statistics.
//!
//! This module provides:
//! - Error type definitions for every layer (initialization, config, database,
//!   providers, probes and the measurement engine)
//! - Run statistics tracking (counted failures and informational metrics)
//!
//! Per-job failures never abort a run. They are logged, counted in
//! [`RunStats`], and the run moves on to the next job.

mod stats;
mod types;

pub use stats::RunStats;
pub use types::{
    ConfigError, DatabaseError, ErrorType, ImportError, InfoType, InitializationError,
    MeasurementError, ProbeError, ProviderError,
};
