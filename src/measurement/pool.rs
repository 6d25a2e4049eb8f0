//! Worker pool for the jobs of one client.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{mpsc, Mutex};

use crate::error_handling::MeasurementError;
use crate::models::Server;

use super::retry::measure_server;
use super::session::ClientSession;
use super::EngineContext;

/// Transient pairing of a client and a server.
struct Job {
    session: Arc<ClientSession>,
    server: Server,
}

/// Outcome of dispatching one client's jobs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DispatchSummary {
    pub jobs: usize,
    pub errors: usize,
}

/// Runs one job per server for `session` and waits for all of them.
///
/// The pool has `min(provider concurrency, servers)` workers pulling from a
/// shared queue. A failed job is counted and logged; it never stops the others.
/// Jobs lost to a panicking worker count as failed.
pub(crate) async fn dispatch(
    ctx: &Arc<EngineContext>,
    session: Arc<ClientSession>,
    servers: &[Server],
) -> DispatchSummary {
    let workers = ctx.provider.max_concurrency().min(servers.len());
    if workers == 0 {
        return DispatchSummary::default();
    }

    let (job_tx, job_rx) = mpsc::channel::<Job>(servers.len());
    let (result_tx, mut result_rx) =
        mpsc::channel::<(i64, Result<(), MeasurementError>)>(servers.len());
    let job_rx = Arc::new(Mutex::new(job_rx));

    let mut tasks = FuturesUnordered::new();
    for _ in 0..workers {
        let ctx = Arc::clone(ctx);
        let job_rx = Arc::clone(&job_rx);
        let result_tx = result_tx.clone();
        tasks.push(tokio::spawn(async move {
            loop {
                let next = job_rx.lock().await.recv().await;
                let Some(job) = next else { break };
                let server_id = job.server.id;
                let result = measure_server(&ctx, &job.session, job.server).await;
                if result_tx.send((server_id, result)).await.is_err() {
                    break;
                }
            }
        }));
    }
    drop(result_tx);

    let client = session.client();
    log::info!(
        "Dispatching {} servers to {} workers for client {} ({}, ISP {})",
        servers.len(),
        workers,
        client.id,
        client.ip,
        client.isp
    );

    let mut queued = 0;
    for server in servers {
        let job = Job {
            session: Arc::clone(&session),
            server: server.clone(),
        };
        // capacity equals the job count, so this never waits
        if job_tx.send(job).await.is_err() {
            log::warn!("Worker queue closed before all jobs were queued");
            break;
        }
        queued += 1;
    }
    drop(job_tx);

    let mut summary = DispatchSummary {
        jobs: queued,
        errors: 0,
    };
    let mut completed = 0;
    while let Some((server_id, result)) = result_rx.recv().await {
        completed += 1;
        if let Err(e) = result {
            summary.errors += 1;
            log::warn!(
                "Measurement of server {} from client {} ({}) failed: {} (errors so far: {})",
                server_id,
                client.id,
                client.ip,
                e,
                summary.errors
            );
        }
    }

    while let Some(joined) = tasks.next().await {
        if let Err(join_error) = joined {
            log::warn!("Measurement worker panicked: {:?}", join_error);
        }
    }

    // a panicked worker loses its current job, and the queue if it was the last one
    let lost = queued - completed;
    if lost > 0 {
        log::warn!(
            "{} jobs for client {} produced no result",
            lost,
            client.id
        );
        summary.errors += lost;
    }

    summary
}
