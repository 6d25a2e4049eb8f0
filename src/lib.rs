//! connectivity_tester library: relay reachability measurements from proxy vantage points
//!
//! This library leases egress clients from a residential or mobile proxy vendor,
//! probes every working relay server through each client over TCP and UDP, retries
//! failed TCP probes with obfuscation prefixes, and stores every attempt in SQLite.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use connectivity_tester::config::AppConfig;
//! use connectivity_tester::models::NetworkType;
//! use connectivity_tester::prober::ExternalProber;
//! use connectivity_tester::provider::{new_provider, ProxySystem};
//! use connectivity_tester::storage::{init_db_pool_with_path, run_migrations, SqliteStore};
//! use connectivity_tester::{MeasurementEngine, Request};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load()?;
//! let pool = init_db_pool_with_path(&config.database.path).await?;
//! run_migrations(&pool).await?;
//!
//! let provider = new_provider(
//!     config.provider_config(ProxySystem::Soax, NetworkType::Mobile),
//!     NetworkType::Mobile,
//! )?;
//! let engine = MeasurementEngine::new(
//!     Arc::new(SqliteStore::new(pool)),
//!     provider,
//!     Arc::new(ExternalProber::from_settings(&config.connectivity)),
//!     config.measurement_config(),
//! );
//!
//! let report = engine
//!     .run(&Request {
//!         country: "ir".to_string(),
//!         isp: None,
//!         network_type: NetworkType::Mobile,
//!         server_ids: Vec::new(),
//!         server_names: Vec::new(),
//!         max_retries: 5,
//!         max_clients: 2,
//!     })
//!     .await?;
//! println!("{} clients, {} jobs", report.clients_leased, report.jobs_dispatched);
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Requirements
//!
//! This library requires a Tokio runtime. Session monitors are spawned tasks
//! and keep running after `run` returns until the engine is shut down.

pub mod config;
pub mod error_handling;
pub mod initialization;
pub mod measurement;
pub mod models;
pub mod prober;
pub mod provider;
pub mod servers;
pub mod storage;
mod utils;

// Re-export public API
pub use config::{AppConfig, LogFormat, LogLevel, MeasurementConfig};
pub use error_handling::{ImportError, MeasurementError, RunStats};
pub use measurement::{MeasurementEngine, Request, RunReport};
pub use servers::{ImportSummary, RetestSelection, RetestSummary, ServerImporter, ServerRetester};
