// Shared test helpers for database setup and scripted collaborators.
//
// This module is included by several test files; not every file uses every helper.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sqlx::Row;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use connectivity_tester::config::AppConfig;
use connectivity_tester::models::{NetworkType, Server};
use connectivity_tester::prober::ExternalProber;
use connectivity_tester::provider::{new_provider, Provider, ProxySystem};
use connectivity_tester::storage::{init_db_pool_with_path, run_migrations, SqliteStore, Store};

/// Egress IP the ipinfo mock reports for the local machine.
pub const LOCAL_EGRESS_IP: &str = "198.51.100.20";

/// Opens a SQLite file in `dir` with migrations applied.
pub async fn file_store(dir: &Path) -> Arc<SqliteStore> {
    let pool = init_db_pool_with_path(&dir.join("measurements.db"))
        .await
        .expect("Failed to create test database");
    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    Arc::new(SqliteStore::new(pool))
}

/// Upserts a server on port 443 for every link and returns their ids.
pub async fn seed_servers(store: &SqliteStore, links: &[(&str, &str)]) -> Vec<i64> {
    let mut ids = Vec::new();
    for (link, name) in links {
        let ip = link
            .rsplit('@')
            .next()
            .and_then(|rest| rest.split(':').next())
            .unwrap_or_default();
        let server = Server {
            ip: ip.to_string(),
            port: "443".to_string(),
            user_info: "key".to_string(),
            full_access_link: link.to_string(),
            scheme: "ss".to_string(),
            name: name.to_string(),
            ip_type: "v4".to_string(),
            ..Server::default()
        };
        ids.push(store.upsert_server(&server).await.expect("upsert server"));
    }
    ids
}

/// ipinfo mock answering the local egress lookup.
pub async fn ipinfo_mock() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "ip": LOCAL_EGRESS_IP,
            "city": "Ashburn",
            "region": "Virginia",
            "country": "US",
            "org": "AS14618 Amazon.com, Inc."
        })))
        .mount(&server)
        .await;
    server
}

/// Direct provider whose ipinfo lookups go to `ipinfo`.
pub fn direct_provider(ipinfo: &MockServer) -> Arc<dyn Provider> {
    let mut config = AppConfig::default();
    config.ipinfo.base_url = ipinfo.uri();
    new_provider(
        config.provider_config(ProxySystem::Direct, NetworkType::Residential),
        NetworkType::Residential,
    )
    .expect("direct provider")
}

/// Prober running `body` as a shell script. `$2` is the transport, `$4` the protocol.
pub fn shell_prober(body: &str, timeout: Duration) -> ExternalProber {
    ExternalProber::new(
        "sh",
        vec!["-c".to_string(), body.to_string(), "sh".to_string()],
        timeout,
    )
}

pub async fn count_rows(store: &SqliteStore, table: &str) -> i64 {
    sqlx::query(&format!("SELECT COUNT(*) AS n FROM {}", table))
        .fetch_one(store.pool())
        .await
        .expect("count rows")
        .get::<i64, _>("n")
}
