//! Scripted collaborators for engine tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::MeasurementConfig;
use crate::error_handling::{DatabaseError, ProbeError, ProviderError};
use crate::models::{Client, Measurement, NetworkType, Protocol, Server, OP_CONNECT};
use crate::prober::{ConnectivityReport, Prober, ReportError, TestReport};
use crate::provider::Provider;
use crate::storage::test_helpers::{test_client, test_server};
use crate::storage::Store;

use super::MeasurementEngine;

/// Provider with a fixed ISP list that leases synthetic clients.
pub(crate) struct FakeProvider {
    name: String,
    isps: Vec<String>,
    /// Empty means direct mode.
    transport: String,
    concurrency: usize,
    client_ttl: chrono::Duration,
    unavailable: HashSet<String>,
    pub valid: AtomicBool,
    pub validate_fails: AtomicBool,
    pub validate_calls: AtomicUsize,
    pub lease_calls: Mutex<Vec<String>>,
    next_session: AtomicU32,
}

impl FakeProvider {
    pub(crate) fn proxied(isps: &[&str]) -> Self {
        Self {
            name: "soax".to_string(),
            isps: isps.iter().map(|s| s.to_string()).collect(),
            transport: "socks5://fake-proxy:1080".to_string(),
            concurrency: 4,
            client_ttl: chrono::Duration::seconds(600),
            unavailable: HashSet::new(),
            valid: AtomicBool::new(true),
            validate_fails: AtomicBool::new(false),
            validate_calls: AtomicUsize::new(0),
            lease_calls: Mutex::new(Vec::new()),
            next_session: AtomicU32::new(1),
        }
    }

    pub(crate) fn direct() -> Self {
        Self {
            name: "none".to_string(),
            transport: String::new(),
            ..Self::proxied(&["Default"])
        }
    }

    pub(crate) fn with_unavailable(mut self, isp: &str) -> Self {
        self.unavailable.insert(isp.to_string());
        self
    }

    pub(crate) fn with_client_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.client_ttl = ttl;
        self
    }

    pub(crate) fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }
}

#[async_trait]
impl Provider for FakeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_isps(
        &self,
        _country: &str,
        _network_type: NetworkType,
    ) -> Result<Vec<String>, ProviderError> {
        Ok(self.isps.clone())
    }

    async fn lease_client(
        &self,
        isp: &str,
        network_type: NetworkType,
        country: &str,
        _max_retries: usize,
    ) -> Result<Client, ProviderError> {
        self.lease_calls.lock().unwrap().push(isp.to_string());
        if self.unavailable.contains(isp) {
            return Err(ProviderError::NotAvailable {
                isp: isp.to_string(),
            });
        }
        let mut client = test_client(isp);
        client.network_type = network_type;
        client.country_code = country.to_string();
        client.proxy = self.name.clone();
        client.session_id = self.next_session.fetch_add(1, Ordering::SeqCst);
        client.expiration_time = Utc::now() + self.client_ttl;
        Ok(client)
    }

    fn build_transport(&self, client: &Client) -> String {
        if self.transport.is_empty() {
            return String::new();
        }
        format!("{}#session-{}", self.transport, client.session_id)
    }

    async fn validate(&self, _client: &Client) -> Result<bool, ProviderError> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        if self.validate_fails.load(Ordering::SeqCst) {
            return Err(ProviderError::Decode("checker unreachable".into()));
        }
        Ok(self.valid.load(Ordering::SeqCst))
    }

    fn max_concurrency(&self) -> usize {
        self.concurrency
    }

    fn session_length(&self) -> Duration {
        Duration::from_secs(self.client_ttl.num_seconds().max(0) as u64)
    }
}

type ProbeFn = dyn Fn(&str, Protocol) -> Result<ConnectivityReport, ProbeError> + Send + Sync;

/// Prober answering through a closure and recording every call.
pub(crate) struct FakeProber {
    answer: Box<ProbeFn>,
    delay: Duration,
    pub calls: Mutex<Vec<(String, Protocol)>>,
}

impl FakeProber {
    pub(crate) fn new<F>(answer: F) -> Self
    where
        F: Fn(&str, Protocol) -> Result<ConnectivityReport, ProbeError> + Send + Sync + 'static,
    {
        Self {
            answer: Box::new(answer),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Makes every probe take `delay`.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn always_ok() -> Self {
        Self::new(|_, protocol| Ok(ok_report(protocol)))
    }

    /// Fails `failing` with a target error unless the transport carries a prefix.
    pub(crate) fn failing_without_prefix(failing: Protocol) -> Self {
        Self::new(move |transport, protocol| {
            if protocol == failing && !transport.contains("prefix=") {
                Ok(failed_report(protocol, "read", "EOF"))
            } else {
                Ok(ok_report(protocol))
            }
        })
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(
        &self,
        transport: &str,
        protocol: Protocol,
        _resolver: &str,
        _domain: &str,
    ) -> Result<ConnectivityReport, ProbeError> {
        self.calls
            .lock()
            .unwrap()
            .push((transport.to_string(), protocol));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.answer)(transport, protocol)
    }
}

pub(crate) fn ok_report(protocol: Protocol) -> ConnectivityReport {
    ConnectivityReport {
        test: TestReport {
            proto: protocol.as_str().to_string(),
            duration_ms: 40,
            ..TestReport::default()
        },
        ..ConnectivityReport::default()
    }
}

pub(crate) fn failed_report(protocol: Protocol, op: &str, msg: &str) -> ConnectivityReport {
    ConnectivityReport {
        test: TestReport {
            proto: protocol.as_str().to_string(),
            duration_ms: 900,
            error: Some(ReportError {
                op: op.to_string(),
                msg: msg.to_string(),
                msg_verbose: format!("{}: {}", op, msg),
                ..ReportError::default()
            }),
            ..TestReport::default()
        },
        ..ConnectivityReport::default()
    }
}

#[derive(Default)]
struct MemoryState {
    clients: Vec<Client>,
    servers: Vec<Server>,
    measurements: Vec<Measurement>,
    expirations: Vec<(i64, DateTime<Utc>)>,
}

/// Store keeping everything in memory.
#[derive(Default)]
pub(crate) struct MemoryStore {
    state: Mutex<MemoryState>,
    pub fail_client_inserts: AtomicBool,
    pub fail_measurement_inserts: AtomicBool,
}

impl MemoryStore {
    pub(crate) fn with_servers(servers: Vec<Server>) -> Self {
        let store = Self::default();
        for server in servers {
            store.add_server(server);
        }
        store
    }

    pub(crate) fn add_server(&self, mut server: Server) -> i64 {
        let mut state = self.state.lock().unwrap();
        server.id = state.servers.len() as i64 + 1;
        state.servers.push(server);
        state.servers.len() as i64
    }

    pub(crate) fn clients(&self) -> Vec<Client> {
        self.state.lock().unwrap().clients.clone()
    }

    pub(crate) fn servers(&self) -> Vec<Server> {
        self.state.lock().unwrap().servers.clone()
    }

    pub(crate) fn measurements(&self) -> Vec<Measurement> {
        self.state.lock().unwrap().measurements.clone()
    }

    pub(crate) fn expirations(&self) -> Vec<(i64, DateTime<Utc>)> {
        self.state.lock().unwrap().expirations.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_client(&self, client: &Client) -> Result<i64, DatabaseError> {
        if self.fail_client_inserts.load(Ordering::SeqCst) {
            return Err(DatabaseError::InvalidValue("client insert disabled".into()));
        }
        let mut state = self.state.lock().unwrap();
        let id = state.clients.len() as i64 + 1;
        state.clients.push(Client {
            id,
            ..client.clone()
        });
        Ok(id)
    }

    async fn get_servers_by_ids(&self, ids: &[i64]) -> Result<Vec<Server>, DatabaseError> {
        let state = self.state.lock().unwrap();
        let found: Vec<Server> = state
            .servers
            .iter()
            .filter(|s| ids.contains(&s.id))
            .cloned()
            .collect();
        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !found.iter().any(|s| s.id == **id))
            .map(|id| id.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(DatabaseError::NotFound(format!(
                "server ids {}",
                missing.join(", ")
            )));
        }
        Ok(found)
    }

    async fn get_servers_by_names(&self, names: &[String]) -> Result<Vec<Server>, DatabaseError> {
        let state = self.state.lock().unwrap();
        let found: Vec<Server> = state
            .servers
            .iter()
            .filter(|s| names.contains(&s.name))
            .cloned()
            .collect();
        if let Some(missing) = names.iter().find(|n| !found.iter().any(|s| &s.name == *n)) {
            return Err(DatabaseError::NotFound(format!("server name {}", missing)));
        }
        Ok(found)
    }

    async fn get_working_servers(
        &self,
        _provider: &str,
        allowed_ports: &[String],
    ) -> Result<Vec<Server>, DatabaseError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .servers
            .iter()
            .filter(|s| s.tcp_error_msg.is_empty() || s.udp_error_msg.is_empty())
            .filter(|s| allowed_ports.is_empty() || allowed_ports.contains(&s.port))
            .cloned()
            .collect())
    }

    async fn insert_measurement(&self, measurement: &Measurement) -> Result<i64, DatabaseError> {
        if self.fail_measurement_inserts.load(Ordering::SeqCst) {
            return Err(DatabaseError::InvalidValue(
                "measurement insert disabled".into(),
            ));
        }
        let mut state = self.state.lock().unwrap();
        let duplicate = state.measurements.iter().any(|m| {
            m.session_id == measurement.session_id
                && m.retry_number == measurement.retry_number
                && m.protocol == measurement.protocol
        });
        if duplicate {
            return Err(DatabaseError::InvalidValue("duplicate measurement".into()));
        }
        let id = state.measurements.len() as i64 + 1;
        state.measurements.push(Measurement {
            id,
            ..measurement.clone()
        });
        Ok(id)
    }

    async fn get_measurements_by_session(
        &self,
        session_id: &str,
        retry_number: u32,
    ) -> Result<Vec<Measurement>, DatabaseError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .measurements
            .iter()
            .filter(|m| m.session_id == session_id && m.retry_number == retry_number)
            .cloned()
            .collect())
    }

    async fn upsert_server(&self, server: &Server) -> Result<i64, DatabaseError> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state
            .servers
            .iter_mut()
            .find(|s| s.full_access_link == server.full_access_link)
        {
            let id = existing.id;
            *existing = Server {
                id,
                ..server.clone()
            };
            return Ok(id);
        }
        let id = state.servers.len() as i64 + 1;
        state.servers.push(Server {
            id,
            ..server.clone()
        });
        Ok(id)
    }

    async fn get_servers_for_retest(
        &self,
        tcp: bool,
        udp: bool,
    ) -> Result<Vec<Server>, DatabaseError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .servers
            .iter()
            .filter(|s| {
                let tcp_broken = !s.tcp_error_op.is_empty() && s.tcp_error_op != OP_CONNECT;
                let udp_broken = !s.udp_error_msg.is_empty();
                match (tcp, udp) {
                    (false, false) => true,
                    _ => (tcp && tcp_broken) || (udp && udp_broken),
                }
            })
            .cloned()
            .collect())
    }

    async fn delete_server(&self, server_id: i64) -> Result<(), DatabaseError> {
        let mut state = self.state.lock().unwrap();
        let before = state.servers.len();
        state.servers.retain(|s| s.id != server_id);
        if state.servers.len() == before {
            return Err(DatabaseError::NotFound(format!("server id {}", server_id)));
        }
        Ok(())
    }

    async fn update_client_expiration(
        &self,
        client_id: i64,
        expiration_time: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let mut state = self.state.lock().unwrap();
        let client = state
            .clients
            .iter_mut()
            .find(|c| c.id == client_id)
            .ok_or_else(|| DatabaseError::NotFound(format!("client {}", client_id)))?;
        client.expiration_time = expiration_time;
        state.expirations.push((client_id, expiration_time));
        Ok(())
    }
}

/// `count` servers on port 443 tagged `group`.
pub(crate) fn servers(count: usize, group: &str) -> Vec<Server> {
    (1..=count)
        .map(|i| {
            let mut server = test_server(&format!("ss://key@192.0.2.{}:443", i), "443", group);
            server.ip = format!("192.0.2.{}", i);
            server
        })
        .collect()
}

pub(crate) fn config(prefixes: &[&str]) -> MeasurementConfig {
    MeasurementConfig {
        prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
        monitor_interval: Duration::from_millis(20),
        shutdown_grace: Duration::from_millis(500),
        ..MeasurementConfig::default()
    }
}

pub(crate) fn engine(
    store: &Arc<MemoryStore>,
    provider: &Arc<FakeProvider>,
    prober: &Arc<FakeProber>,
    config: MeasurementConfig,
) -> MeasurementEngine {
    MeasurementEngine::new(store.clone(), provider.clone(), prober.clone(), config)
}
