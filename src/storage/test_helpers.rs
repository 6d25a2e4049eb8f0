//! Shared test helpers for storage module tests.
//!
//! Database setup and record builders used across storage and engine tests.

use chrono::{Duration, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::models::{Client, Measurement, NetworkType, Protocol, Server, OP_SUCCESS};
use crate::storage::{insert_client, run_migrations, upsert_server};

/// Creates a test database pool with migrations applied.
/// Uses an in-memory database for fast test execution. Every connection to
/// `sqlite::memory:` is a separate database, so the pool holds exactly one.
pub async fn create_test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test database pool");
    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

/// A not-yet-persisted residential client valid for ten minutes.
pub fn test_client(isp: &str) -> Client {
    let now = Utc::now();
    Client {
        id: 0,
        ip: "198.51.100.7".to_string(),
        network_type: NetworkType::Residential,
        session_id: 4242,
        session_length_secs: 600,
        created_at: now,
        expiration_time: now + Duration::seconds(600),
        ip_version: "v4".to_string(),
        carrier: String::new(),
        city: "Tehran".to_string(),
        country_code: "IR".to_string(),
        country_name: "Iran".to_string(),
        as_number: "AS44244".to_string(),
        as_org: "Iran Cell Service and Communication Company".to_string(),
        isp: isp.to_string(),
        proxy: "soax".to_string(),
        last_seen: now,
    }
}

/// A server without recorded errors.
pub fn test_server(link: &str, port: &str, name: &str) -> Server {
    Server {
        ip: "192.0.2.10".to_string(),
        port: port.to_string(),
        full_access_link: link.to_string(),
        scheme: "ss".to_string(),
        name: name.to_string(),
        ip_type: "v4".to_string(),
        ..Server::default()
    }
}

/// A successful attempt with an empty JSON report.
pub fn test_measurement(
    client_id: i64,
    server_id: i64,
    session_id: &str,
    protocol: Protocol,
    retry_number: u32,
) -> Measurement {
    Measurement {
        id: 0,
        client_id,
        server_id,
        time: Utc::now(),
        protocol,
        session_id: session_id.to_string(),
        retry_number,
        prefix_used: String::new(),
        error_msg: String::new(),
        error_msg_verbose: String::new(),
        error_op: OP_SUCCESS.to_string(),
        duration_ms: 25,
        full_report: Some("{}".to_string()),
    }
}

/// Inserts one client and one server and returns their ids.
pub async fn seed_client_and_server(pool: &SqlitePool) -> (i64, i64) {
    let client_id = insert_client(pool, &test_client("Irancell"))
        .await
        .expect("Failed to insert test client");
    let server_id = upsert_server(pool, &test_server("ss://seed@192.0.2.99:443", "443", "seed"))
        .await
        .expect("Failed to insert test server");
    (client_id, server_id)
}
