//! Active client sessions.
//!
//! A [`ClientSession`] is a persisted client together with its transport. The
//! [`SessionRegistry`] maps client ids to the session and the handle of its
//! monitor task; it is the only structure mutated concurrently by workers and
//! monitors.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::models::Client;

#[derive(Debug)]
pub struct ClientSession {
    client: Client,
    transport: String,
    /// Starts at the leased expiration; moved to the invalidation time by the monitor.
    expires_at: RwLock<DateTime<Utc>>,
}

impl ClientSession {
    pub fn new(client: Client, transport: String) -> Self {
        Self {
            expires_at: RwLock::new(client.expiration_time),
            client,
            transport,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn id(&self) -> i64 {
        self.client.id
    }

    /// Proxy transport, empty in direct mode.
    pub fn transport(&self) -> &str {
        &self.transport
    }

    pub fn is_direct(&self) -> bool {
        self.transport.is_empty()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        *self.expires_at.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at() <= now
    }

    /// Marks the session as expired at `at`.
    pub fn expire(&self, at: DateTime<Utc>) {
        *self.expires_at.write().unwrap_or_else(PoisonError::into_inner) = at;
    }
}

struct MonitorHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Registry of monitored client sessions keyed by client id.
#[derive(Default)]
pub(crate) struct SessionRegistry {
    inner: tokio::sync::RwLock<HashMap<i64, MonitorHandle>>,
}

impl SessionRegistry {
    /// Registers a session whose monitor is produced by `spawn`.
    ///
    /// The write lock is held while spawning, so the monitor cannot observe the
    /// registry before its own entry exists.
    pub(crate) async fn register<F>(&self, client_id: i64, spawn: F)
    where
        F: FnOnce(CancellationToken) -> JoinHandle<()>,
    {
        let mut sessions = self.inner.write().await;
        let cancel = CancellationToken::new();
        let task = spawn(cancel.clone());
        if let Some(previous) = sessions.insert(client_id, MonitorHandle { cancel, task }) {
            previous.cancel.cancel();
        }
    }

    pub(crate) async fn contains(&self, client_id: i64) -> bool {
        self.inner.read().await.contains_key(&client_id)
    }

    /// Removes the entry and cancels its monitor. Returns false if it was not registered.
    pub(crate) async fn remove(&self, client_id: i64) -> bool {
        match self.inner.write().await.remove(&client_id) {
            Some(handle) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub(crate) async fn active_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.inner.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Cancels every monitor and waits up to `grace` for them to exit.
    ///
    /// Monitors still running after the grace period are aborted.
    pub(crate) async fn shutdown(&self, grace: std::time::Duration) {
        let handles: Vec<MonitorHandle> = self.inner.write().await.drain().map(|(_, h)| h).collect();
        if handles.is_empty() {
            return;
        }

        for handle in &handles {
            handle.cancel.cancel();
        }
        let aborts: Vec<_> = handles.iter().map(|h| h.task.abort_handle()).collect();
        let count = handles.len();

        let joined = futures::future::join_all(handles.into_iter().map(|h| h.task));
        if tokio::time::timeout(grace, joined).await.is_err() {
            log::warn!(
                "Session monitors did not stop within {:?}, aborting them",
                grace
            );
            for abort in aborts {
                abort.abort();
            }
        } else {
            log::debug!("Stopped {} session monitors", count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_helpers::test_client;
    use std::time::Duration;

    #[test]
    fn test_session_expiration() {
        let client = test_client("MCI");
        let leased_until = client.expiration_time;
        let session = ClientSession::new(client, "socks5://p".to_string());

        assert!(!session.is_direct());
        assert_eq!(session.expires_at(), leased_until);
        assert!(!session.is_expired_at(Utc::now()));

        let now = Utc::now();
        session.expire(now);
        assert!(session.is_expired_at(now));
        assert!(ClientSession::new(test_client("x"), String::new()).is_direct());
    }

    #[tokio::test]
    async fn test_register_remove_and_shutdown() {
        let registry = SessionRegistry::default();

        for id in [3, 1, 2] {
            registry
                .register(id, |cancel| {
                    tokio::spawn(async move { cancel.cancelled().await })
                })
                .await;
        }
        assert_eq!(registry.active_ids().await, vec![1, 2, 3]);

        assert!(registry.remove(2).await);
        assert!(!registry.remove(2).await);
        assert!(!registry.contains(2).await);

        tokio::time::timeout(
            Duration::from_secs(1),
            registry.shutdown(Duration::from_millis(500)),
        )
        .await
        .unwrap();
        assert!(registry.active_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_aborts_stuck_monitor() {
        let registry = SessionRegistry::default();
        registry
            .register(1, |_cancel| {
                tokio::spawn(async {
                    // ignores cancellation
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                })
            })
            .await;

        let started = std::time::Instant::now();
        registry.shutdown(Duration::from_millis(50)).await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!registry.contains(1).await);
    }
}
