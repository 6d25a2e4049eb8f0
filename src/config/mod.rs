//! Application configuration and constants.
//!
//! This module provides:
//! - Configuration constants (timeouts, defaults, vendor endpoints)
//! - CLI option enums and the engine's [`MeasurementConfig`]
//! - YAML configuration file loading ([`AppConfig`])

mod constants;
mod file;
mod types;

pub use constants::*;
pub use file::{
    AppConfig, ConnectivitySettings, DatabaseSettings, DirectSettings, IpInfoSettings,
    MeasurementSettings, ProxyRackSettings, SoaxSettings,
};
pub use types::{LogFormat, LogLevel, MeasurementConfig};
