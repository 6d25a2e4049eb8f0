//! Session monitor.
//!
//! One task per leased client re-validates its egress IP on a fixed interval.
//! The monitor never touches the worker pool; an invalidated client only stops
//! receiving new probes through the expiration guard of the retry engine.

use std::sync::Arc;

use chrono::Utc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error_handling::{ErrorType, InfoType};

use super::session::ClientSession;
use super::EngineContext;

/// Registers `session` and starts its monitor.
pub(crate) async fn start(ctx: &Arc<EngineContext>, session: Arc<ClientSession>) {
    let task_ctx = Arc::clone(ctx);
    ctx.sessions
        .register(session.id(), move |cancel| {
            tokio::spawn(monitor_client(task_ctx, session, cancel))
        })
        .await;
}

async fn monitor_client(
    ctx: Arc<EngineContext>,
    session: Arc<ClientSession>,
    cancel: CancellationToken,
) {
    let client = session.client();
    let period = ctx.config.monitor_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    log::debug!("Monitoring client {} ({})", client.id, client.ip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !ctx.sessions.contains(client.id).await {
            break;
        }

        let now = Utc::now();
        if session.is_expired_at(now) {
            log::debug!("Client {} lease ended, stopping monitor", client.id);
            ctx.sessions.remove(client.id).await;
            break;
        }

        let valid = tokio::select! {
            _ = cancel.cancelled() => break,
            valid = ctx.provider.validate(client) => valid,
        };

        match valid {
            Ok(true) => {}
            Ok(false) => {
                let now = Utc::now();
                session.expire(now);
                ctx.sessions.remove(client.id).await;
                ctx.stats.increment_info(InfoType::ClientInvalidated);
                log::info!(
                    "Client {} ({}, ISP {}) is no longer valid, marked expired",
                    client.id,
                    client.ip,
                    client.isp
                );
                if let Err(e) = ctx.store.update_client_expiration(client.id, now).await {
                    log::warn!(
                        "Failed to persist expiration of client {}: {}",
                        client.id,
                        e
                    );
                }
                break;
            }
            Err(e) => {
                ctx.stats.increment_error(ErrorType::SessionCheckError);
                log::warn!("Validity check for client {} failed: {}", client.id, e);
            }
        }
    }

    log::debug!("Monitor for client {} stopped", client.id);
}
