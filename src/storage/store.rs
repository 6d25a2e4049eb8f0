//! SQLite-backed [`Store`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error_handling::DatabaseError;
use crate::models::{Client, Measurement, Server};

use super::Store;

/// [`Store`] implementation over a shared SQLite pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Arc<SqlitePool>,
}

impl SqliteStore {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_client(&self, client: &Client) -> Result<i64, DatabaseError> {
        super::insert_client(&self.pool, client).await
    }

    async fn get_servers_by_ids(&self, ids: &[i64]) -> Result<Vec<Server>, DatabaseError> {
        super::get_servers_by_ids(&self.pool, ids).await
    }

    async fn get_servers_by_names(&self, names: &[String]) -> Result<Vec<Server>, DatabaseError> {
        super::get_servers_by_names(&self.pool, names).await
    }

    async fn get_working_servers(
        &self,
        provider: &str,
        allowed_ports: &[String],
    ) -> Result<Vec<Server>, DatabaseError> {
        log::debug!("Fetching working servers for provider {}", provider);
        super::get_working_servers(&self.pool, allowed_ports).await
    }

    async fn insert_measurement(&self, measurement: &Measurement) -> Result<i64, DatabaseError> {
        super::insert_measurement(&self.pool, measurement).await
    }

    async fn get_measurements_by_session(
        &self,
        session_id: &str,
        retry_number: u32,
    ) -> Result<Vec<Measurement>, DatabaseError> {
        super::get_measurements_by_session(&self.pool, session_id, retry_number).await
    }

    async fn upsert_server(&self, server: &Server) -> Result<i64, DatabaseError> {
        super::upsert_server(&self.pool, server).await
    }

    async fn get_servers_for_retest(
        &self,
        tcp: bool,
        udp: bool,
    ) -> Result<Vec<Server>, DatabaseError> {
        super::get_servers_for_retest(&self.pool, tcp, udp).await
    }

    async fn delete_server(&self, server_id: i64) -> Result<(), DatabaseError> {
        super::delete_server(&self.pool, server_id).await
    }

    async fn update_client_expiration(
        &self,
        client_id: i64,
        expiration_time: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        super::update_client_expiration(&self.pool, client_id, expiration_time).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Protocol;
    use crate::storage::test_helpers::{create_test_pool, test_client, test_measurement, test_server};

    #[tokio::test]
    async fn test_sqlite_store_round_trip_through_trait() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(Arc::new(create_test_pool().await)));

        let client_id = store.insert_client(&test_client("MTN")).await.unwrap();
        let server_id = store
            .upsert_server(&test_server("ss://x@192.0.2.5:443", "443", "g"))
            .await
            .unwrap();

        let working = store.get_working_servers("soax", &[]).await.unwrap();
        assert_eq!(working.len(), 1);

        store
            .insert_measurement(&test_measurement(client_id, server_id, "s", Protocol::Tcp, 0))
            .await
            .unwrap();
        let rows = store.get_measurements_by_session("s", 0).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].client_id, client_id);

        assert!(store
            .update_client_expiration(client_id, Utc::now())
            .await
            .is_ok());
    }
}
