//! Persistence of clients, servers and measurements.
//!
//! The engine talks to storage only through the [`Store`] trait. [`SqliteStore`]
//! is the production implementation on top of the free query functions in the
//! submodules, which take a `SqlitePool` directly.
//!
//! Timestamps are stored as milliseconds since the Unix epoch.

mod client;
mod measurement;
mod migrations;
mod pool;
mod server;
mod store;

#[cfg(test)]
pub mod test_helpers;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error_handling::DatabaseError;
use crate::models::{Client, Measurement, Server};

pub use client::{get_client, insert_client, update_client_expiration};
pub use measurement::{get_measurements_by_session, insert_measurement};
pub use migrations::run_migrations;
pub use pool::init_db_pool_with_path;
pub use server::{
    delete_server, get_servers_by_ids, get_servers_by_names, get_servers_for_retest,
    get_working_servers, upsert_server,
};
pub use store::SqliteStore;

/// Storage operations used by the measurement engine.
///
/// Implementations must be safe for concurrent use from many workers. A missing
/// row is reported as [`DatabaseError::NotFound`].
#[async_trait]
pub trait Store: Send + Sync {
    /// Persists a leased client and returns its assigned id.
    async fn insert_client(&self, client: &Client) -> Result<i64, DatabaseError>;

    /// Exactly the servers with these ids; `NotFound` if any id is unknown.
    async fn get_servers_by_ids(&self, ids: &[i64]) -> Result<Vec<Server>, DatabaseError>;

    /// Every server tagged with one of these names; `NotFound` if any name matches nothing.
    async fn get_servers_by_names(&self, names: &[String]) -> Result<Vec<Server>, DatabaseError>;

    /// Servers usable through `provider`: at least one protocol without a recorded
    /// error, listening on one of `allowed_ports` (any port when empty).
    async fn get_working_servers(
        &self,
        provider: &str,
        allowed_ports: &[String],
    ) -> Result<Vec<Server>, DatabaseError>;

    async fn insert_measurement(&self, measurement: &Measurement) -> Result<i64, DatabaseError>;

    async fn get_measurements_by_session(
        &self,
        session_id: &str,
        retry_number: u32,
    ) -> Result<Vec<Measurement>, DatabaseError>;

    /// Inserts or updates a server keyed by its access link; returns its id.
    async fn upsert_server(&self, server: &Server) -> Result<i64, DatabaseError>;

    /// Servers selected for a retest; every server when neither flag is set.
    async fn get_servers_for_retest(
        &self,
        tcp: bool,
        udp: bool,
    ) -> Result<Vec<Server>, DatabaseError>;

    async fn delete_server(&self, server_id: i64) -> Result<(), DatabaseError>;

    async fn update_client_expiration(
        &self,
        client_id: i64,
        expiration_time: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;
}

pub(crate) fn ms_to_datetime(ms: i64) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| DatabaseError::InvalidValue(format!("timestamp {} out of range", ms)))
}
