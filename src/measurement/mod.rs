//! Measurement orchestration engine.
//!
//! [`MeasurementEngine::run`] drives one measurement run:
//! - the job builder resolves the request into servers and ISPs ([`Plan`])
//! - for every ISP and client slot a client is leased, persisted and monitored
//! - the client's servers are measured by a bounded worker pool, each job
//!   running the protocol retry engine
//!
//! Leasing and persistence happen one client at a time; only the probes of a
//! single client run in parallel. Session monitors keep running after `run`
//! returns until [`MeasurementEngine::shutdown`] or
//! [`MeasurementEngine::stop_monitoring`] stops them.

mod monitor;
mod plan;
mod pool;
mod retry;
mod session;

#[cfg(test)]
pub(crate) mod test_helpers;

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::config::{MeasurementConfig, DEFAULT_MONITOR_INTERVAL};
use crate::error_handling::{ErrorType, MeasurementError, ProviderError, RunStats};
use crate::models::NetworkType;
use crate::prober::Prober;
use crate::provider::Provider;
use crate::storage::Store;

pub use plan::Plan;
pub use retry::{link_with_prefix, plan_retries, probe_transport, RetryStep};
pub use session::ClientSession;

use session::SessionRegistry;

/// What to measure. Immutable for the duration of a run.
#[derive(Debug, Clone)]
pub struct Request {
    /// ISO country code the clients must egress from.
    pub country: String,
    /// Only lease clients for this ISP; all ISPs of the country otherwise.
    pub isp: Option<String>,
    pub network_type: NetworkType,
    /// Explicit server selection by id. Mutually exclusive with `server_names`.
    pub server_ids: Vec<i64>,
    /// Explicit server selection by name tag.
    pub server_names: Vec<String>,
    /// Lease attempts per client slot.
    pub max_retries: usize,
    /// Client slots per ISP.
    pub max_clients: usize,
}

/// Summary of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub provider: String,
    pub isps: usize,
    pub lease_attempts: usize,
    pub clients_leased: usize,
    pub jobs_dispatched: usize,
    pub job_errors: usize,
    pub elapsed_seconds: f64,
}

/// State shared by the acquisition loop, the workers and the monitors.
pub(crate) struct EngineContext {
    pub store: Arc<dyn Store>,
    pub provider: Arc<dyn Provider>,
    pub prober: Arc<dyn Prober>,
    pub config: MeasurementConfig,
    pub stats: RunStats,
    pub sessions: SessionRegistry,
}

pub struct MeasurementEngine {
    ctx: Arc<EngineContext>,
}

impl MeasurementEngine {
    /// Creates an engine. A zero monitor interval is replaced by the default.
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn Provider>,
        prober: Arc<dyn Prober>,
        mut config: MeasurementConfig,
    ) -> Self {
        if config.monitor_interval.is_zero() {
            log::warn!(
                "Monitor interval must be greater than zero, using {:?}",
                DEFAULT_MONITOR_INTERVAL
            );
            config.monitor_interval = DEFAULT_MONITOR_INTERVAL;
        }
        Self {
            ctx: Arc::new(EngineContext {
                store,
                provider,
                prober,
                config,
                stats: RunStats::new(),
                sessions: SessionRegistry::default(),
            }),
        }
    }

    /// Runs the measurement described by `request`.
    ///
    /// Fails only when the run cannot make progress: ambiguous server
    /// selection, unknown requested servers, no working servers or no ISPs.
    /// Lease, persistence and probe failures are logged and counted.
    pub async fn run(&self, request: &Request) -> Result<RunReport, MeasurementError> {
        let started = Instant::now();
        let plan = plan::build_plan(
            self.ctx.store.as_ref(),
            self.ctx.provider.as_ref(),
            &self.ctx.config,
            request,
        )
        .await?;

        let mut report = RunReport {
            provider: self.ctx.provider.name().to_string(),
            isps: plan.isps.len(),
            ..RunReport::default()
        };

        for isp in &plan.isps {
            for slot in 0..request.max_clients {
                report.lease_attempts += 1;
                let Some(session) = self.acquire_client(isp, slot, request).await else {
                    continue;
                };
                report.clients_leased += 1;

                let summary = pool::dispatch(&self.ctx, session, &plan.servers).await;
                report.jobs_dispatched += summary.jobs;
                report.job_errors += summary.errors;
            }
        }

        report.elapsed_seconds = started.elapsed().as_secs_f64();
        log::info!(
            "Run finished: {} clients leased in {} attempts, {} jobs, {} job errors, {:.1}s",
            report.clients_leased,
            report.lease_attempts,
            report.jobs_dispatched,
            report.job_errors,
            report.elapsed_seconds
        );
        self.ctx.stats.log_summary();
        Ok(report)
    }

    /// Leases, persists and starts monitoring one client. `None` skips the slot.
    async fn acquire_client(
        &self,
        isp: &str,
        slot: usize,
        request: &Request,
    ) -> Option<Arc<ClientSession>> {
        let ctx = &self.ctx;
        let mut client = match ctx
            .provider
            .lease_client(isp, request.network_type, &request.country, request.max_retries)
            .await
        {
            Ok(client) => client,
            Err(e) => {
                ctx.stats.increment_error(ErrorType::ClientLeaseError);
                match e {
                    ProviderError::NotAvailable { .. } => {
                        log::info!("Skipping client slot {} for ISP {}: {}", slot, isp, e)
                    }
                    _ => log::warn!("Failed to lease client {} for ISP {}: {}", slot, isp, e),
                }
                return None;
            }
        };

        client.id = match ctx.store.insert_client(&client).await {
            Ok(id) => id,
            Err(e) => {
                ctx.stats.increment_error(ErrorType::ClientPersistError);
                log::warn!(
                    "Failed to save client {} (ISP {}): {}",
                    client.ip,
                    isp,
                    e
                );
                return None;
            }
        };
        log::info!(
            "Leased client {} ({}, ISP {}, session {}) until {}",
            client.id,
            client.ip,
            client.isp,
            client.session_id,
            client.expiration_time
        );

        let transport = ctx.provider.build_transport(&client);
        let session = Arc::new(ClientSession::new(client, transport));
        monitor::start(ctx, Arc::clone(&session)).await;
        Some(session)
    }

    /// Stops every session monitor, waiting up to the configured grace period.
    pub async fn shutdown(&self) {
        log::info!("Shutting down session monitors");
        self.ctx
            .sessions
            .shutdown(self.ctx.config.shutdown_grace)
            .await;
    }

    /// Stops monitoring one client. Returns false if it was not being monitored.
    pub async fn stop_monitoring(&self, client_id: i64) -> bool {
        self.ctx.sessions.remove(client_id).await
    }

    /// Ids of the clients currently monitored.
    pub async fn active_clients(&self) -> Vec<i64> {
        self.ctx.sessions.active_ids().await
    }

    pub fn stats(&self) -> &RunStats {
        &self.ctx.stats
    }
}
