//! Direct retest of stored servers.
//!
//! Servers are probed without a proxy and their last known errors rewritten,
//! which keeps the working-server selection current between measurement runs.
//! A server whose probe cannot be run at all is removed.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;

use crate::config::{MeasurementConfig, DEFAULT_RETEST_CONCURRENCY};
use crate::error_handling::DatabaseError;
use crate::models::{Protocol, Server};
use crate::prober::Prober;
use crate::storage::Store;
use crate::utils::sanitize::sanitize_and_truncate_error_message;

/// Which failures to retest.
///
/// `tcp` picks servers with a TCP error other than a connect failure, `udp`
/// servers with a UDP error. Only the flagged protocols are probed. Without
/// either flag every server is probed over both protocols.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetestSelection {
    pub tcp: bool,
    pub udp: bool,
}

impl RetestSelection {
    pub fn protocols(&self) -> Vec<Protocol> {
        let all = !self.tcp && !self.udp;
        Protocol::ALL
            .into_iter()
            .filter(|protocol| {
                all || match protocol {
                    Protocol::Tcp => self.tcp,
                    Protocol::Udp => self.udp,
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetestSummary {
    pub tested: usize,
    pub updated: usize,
    pub removed: usize,
    /// Servers whose new state could not be written.
    pub errors: usize,
}

enum Outcome {
    Updated,
    Removed,
    StoreError,
}

pub struct ServerRetester {
    store: Arc<dyn Store>,
    prober: Arc<dyn Prober>,
    resolver: String,
    domain: String,
    concurrency: usize,
}

impl ServerRetester {
    /// Uses the resolver and probe domain of `config`.
    pub fn new(store: Arc<dyn Store>, prober: Arc<dyn Prober>, config: &MeasurementConfig) -> Self {
        Self {
            store,
            prober,
            resolver: config.resolver_address.clone(),
            domain: config.probe_domain.clone(),
            concurrency: DEFAULT_RETEST_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Retests the servers picked by `selection`.
    ///
    /// Only loading the selection can fail; per-server problems are logged and
    /// counted in the summary.
    pub async fn retest(&self, selection: RetestSelection) -> Result<RetestSummary, DatabaseError> {
        let servers = self
            .store
            .get_servers_for_retest(selection.tcp, selection.udp)
            .await?;
        let protocols = selection.protocols();
        log::info!(
            "Retesting {} servers over {:?} with {} workers",
            servers.len(),
            protocols,
            self.concurrency
        );

        let semaphore = Semaphore::new(self.concurrency);
        let mut summary = RetestSummary {
            tested: servers.len(),
            ..RetestSummary::default()
        };

        let mut tasks: FuturesUnordered<_> = servers
            .into_iter()
            .map(|server| {
                let semaphore = &semaphore;
                let protocols = &protocols;
                async move {
                    let _permit = semaphore.acquire().await;
                    self.retest_server(server, protocols).await
                }
            })
            .collect();

        while let Some(outcome) = tasks.next().await {
            match outcome {
                Outcome::Updated => summary.updated += 1,
                Outcome::Removed => summary.removed += 1,
                Outcome::StoreError => summary.errors += 1,
            }
        }

        log::info!(
            "Retest finished: {} servers, {} updated, {} removed, {} errors",
            summary.tested,
            summary.updated,
            summary.removed,
            summary.errors
        );
        Ok(summary)
    }

    async fn retest_server(&self, mut server: Server, protocols: &[Protocol]) -> Outcome {
        let mut unreachable = false;
        for &protocol in protocols {
            let outcome = self
                .prober
                .probe(&server.full_access_link, protocol, &self.resolver, &self.domain)
                .await;
            match outcome {
                Ok(report) => match &report.test.error {
                    Some(error) => server.set_last_error(
                        protocol,
                        &sanitize_and_truncate_error_message(&error.msg),
                        &error.op,
                    ),
                    None => server.set_last_error(protocol, "", ""),
                },
                Err(e) => {
                    log::warn!(
                        "{} probe of server {} ({}) could not run: {}",
                        protocol,
                        server.id,
                        server.full_access_link,
                        e
                    );
                    unreachable = true;
                }
            }
        }

        if unreachable {
            return match self.store.delete_server(server.id).await {
                Ok(()) => {
                    log::info!(
                        "Removed server {} ({}) after a failed probe",
                        server.id,
                        server.full_access_link
                    );
                    Outcome::Removed
                }
                Err(e) => {
                    log::error!("Failed to remove server {}: {}", server.id, e);
                    Outcome::StoreError
                }
            };
        }

        server.last_test_time = Some(Utc::now());
        match self.store.upsert_server(&server).await {
            Ok(_) => {
                log::debug!(
                    "Server {} tested: tcp error {:?}, udp error {:?}",
                    server.id,
                    server.tcp_error_msg,
                    server.udp_error_msg
                );
                Outcome::Updated
            }
            Err(e) => {
                log::error!("Failed to save test results of server {}: {}", server.id, e);
                Outcome::StoreError
            }
        }
    }
}
