//! Protocol retry engine.
//!
//! One pass measures one server from one client:
//! 1. abort with [`MeasurementError::Expired`] if the client session has ended
//! 2. probe every protocol once (retry 0), skipping protocols the server is
//!    known to fail on unless running in direct mode
//! 3. read the retry-0 rows back and collect the failed protocols
//! 4. run the retries from [`plan_retries`] in order
//!
//! Every probe outcome is stored as its own measurement row.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error_handling::{ErrorType, InfoType, MeasurementError, ProbeError};
use crate::models::{Measurement, Protocol, Server, OP_FAIL, OP_SUCCESS};
use crate::prober::ConnectivityReport;
use crate::utils::sanitize::sanitize_and_truncate_error_message;

use super::session::ClientSession;
use super::EngineContext;

/// One planned retry attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryStep {
    pub retry_number: u32,
    pub protocol: Protocol,
    /// Obfuscation prefix appended to the access link; `None` for a bare retry.
    pub prefix: Option<String>,
}

/// Retries for the protocols that failed in the initial round.
///
/// Each failed protocol gets one bare retry followed, for stream protocols
/// only, by one retry per prefix. Protocols are handled in [`Protocol::ALL`]
/// order and share a single retry counter starting at 1.
pub fn plan_retries(failed: &[Protocol], prefixes: &[String]) -> Vec<RetryStep> {
    let mut steps = Vec::new();
    let mut retry_number = 0;

    for protocol in Protocol::ALL.iter().filter(|p| failed.contains(p)) {
        retry_number += 1;
        steps.push(RetryStep {
            retry_number,
            protocol: *protocol,
            prefix: None,
        });

        if protocol.supports_prefix() {
            for prefix in prefixes {
                retry_number += 1;
                steps.push(RetryStep {
                    retry_number,
                    protocol: *protocol,
                    prefix: Some(prefix.clone()),
                });
            }
        }
    }

    steps
}

/// Appends `prefix` to the access link as a query parameter.
pub fn link_with_prefix(access_link: &str, prefix: &str) -> String {
    let separator = if access_link.contains('?') { '&' } else { '?' };
    format!("{}{}prefix={}", access_link, separator, prefix)
}

/// Transport handed to the prober: the proxy chained with the relay link.
pub fn probe_transport(proxy_transport: &str, access_link: &str) -> String {
    if proxy_transport.is_empty() {
        access_link.to_string()
    } else {
        format!("{}|{}", proxy_transport, access_link)
    }
}

/// Runs one measurement pass of `server` from `session`.
pub(crate) async fn measure_server(
    ctx: &Arc<EngineContext>,
    session: &ClientSession,
    mut server: Server,
) -> Result<(), MeasurementError> {
    let client = session.client();
    if session.is_expired_at(Utc::now()) {
        ctx.stats.increment_error(ErrorType::ClientExpired);
        return Err(MeasurementError::Expired {
            client_id: client.id,
        });
    }

    let session_id = Uuid::new_v4().to_string();
    log::debug!(
        "Measuring server {} ({}) from client {} ({}), session {}",
        server.id,
        server.ip,
        client.id,
        client.ip,
        session_id
    );

    for protocol in Protocol::ALL {
        if !session.is_direct() && server.has_persistent_failure(protocol) {
            ctx.stats.increment_info(InfoType::ProtocolSkipped);
            log::debug!(
                "Skipping {} for server {}:{}, last error: {}",
                protocol,
                server.ip,
                server.port,
                server.last_error(protocol).0
            );
            continue;
        }
        let step = RetryStep {
            retry_number: 0,
            protocol,
            prefix: None,
        };
        probe_once(ctx, session, &mut server, &session_id, &step).await?;
    }

    let initial = ctx
        .store
        .get_measurements_by_session(&session_id, 0)
        .await
        .map_err(|e| {
            ctx.stats.increment_error(ErrorType::MeasurementReadError);
            e
        })?;
    let failed: Vec<Protocol> = initial
        .iter()
        .filter(|m| m.is_failure())
        .map(|m| m.protocol)
        .collect();

    for step in plan_retries(&failed, &ctx.config.prefixes) {
        ctx.stats.increment_info(if step.prefix.is_some() {
            InfoType::PrefixRetry
        } else {
            InfoType::BareRetry
        });
        if let Err(e) = probe_once(ctx, session, &mut server, &session_id, &step).await {
            log::warn!(
                "Retry {} ({}, prefix {:?}) for server {} failed: {}",
                step.retry_number,
                step.protocol,
                step.prefix,
                server.id,
                e
            );
        }
    }

    Ok(())
}

/// Probes once and stores the outcome.
///
/// In direct mode the server's last known error for the protocol is updated
/// and written back as well.
async fn probe_once(
    ctx: &Arc<EngineContext>,
    session: &ClientSession,
    server: &mut Server,
    session_id: &str,
    step: &RetryStep,
) -> Result<(), MeasurementError> {
    let client = session.client();
    let access_link = match &step.prefix {
        Some(prefix) => link_with_prefix(&server.full_access_link, prefix),
        None => server.full_access_link.clone(),
    };
    let transport = probe_transport(session.transport(), &access_link);

    log::debug!(
        "Probing {} server {} from client {}, session {} retry {}",
        step.protocol,
        server.id,
        client.id,
        session_id,
        step.retry_number
    );

    let started = Utc::now();
    let outcome = ctx
        .prober
        .probe(
            &transport,
            step.protocol,
            &ctx.config.resolver_address,
            &ctx.config.probe_domain,
        )
        .await;

    let mut measurement = Measurement {
        id: 0,
        client_id: client.id,
        server_id: server.id,
        time: started,
        protocol: step.protocol,
        session_id: session_id.to_string(),
        retry_number: step.retry_number,
        prefix_used: step.prefix.clone().unwrap_or_default(),
        error_msg: String::new(),
        error_msg_verbose: String::new(),
        error_op: String::new(),
        duration_ms: 0,
        full_report: None,
    };
    let report = record_outcome(&mut measurement, outcome, &ctx.config.resolver_address);
    match serde_json::to_string(&report) {
        Ok(json) => measurement.full_report = Some(json),
        Err(e) => log::warn!("Failed to serialize probe report: {}", e),
    }

    if measurement.error_op == OP_FAIL {
        ctx.stats.increment_error(ErrorType::ProbeDialError);
        log::warn!(
            "Probe {} of server {} from client {} ({}) could not run: {}",
            step.protocol,
            server.id,
            client.id,
            client.ip,
            measurement.error_msg
        );
    } else if measurement.is_failure() {
        ctx.stats.increment_error(ErrorType::ProbeTargetError);
    }

    ctx.store
        .insert_measurement(&measurement)
        .await
        .map_err(|e| {
            ctx.stats.increment_error(ErrorType::MeasurementPersistError);
            log::warn!(
                "Failed to save {} measurement for server {}, session {} retry {}: {}",
                step.protocol,
                server.id,
                session_id,
                step.retry_number,
                e
            );
            e
        })?;

    if session.is_direct() {
        if measurement.is_failure() {
            server.set_last_error(step.protocol, &measurement.error_msg, &measurement.error_op);
        } else {
            server.set_last_error(step.protocol, "", "");
        }
        server.last_test_time = Some(started);
        if let Err(e) = ctx.store.upsert_server(server).await {
            ctx.stats.increment_error(ErrorType::ServerUpdateError);
            log::warn!("Failed to update server {}: {}", server.id, e);
        }
    }

    Ok(())
}

/// Fills the outcome fields of `measurement` and returns the report to store.
///
/// A prober error is recorded with the "fail" operation and a report holding
/// only the probe inputs.
fn record_outcome(
    measurement: &mut Measurement,
    outcome: Result<ConnectivityReport, ProbeError>,
    resolver: &str,
) -> ConnectivityReport {
    match outcome {
        Err(e) => {
            measurement.error_msg = sanitize_and_truncate_error_message(&e.to_string());
            measurement.error_op = OP_FAIL.to_string();
            ConnectivityReport::unavailable(resolver, measurement.protocol.as_str())
        }
        Ok(report) => {
            measurement.duration_ms = report.test.duration_ms;
            match &report.test.error {
                Some(error) => {
                    measurement.error_msg = sanitize_and_truncate_error_message(&error.msg);
                    measurement.error_msg_verbose =
                        sanitize_and_truncate_error_message(&error.msg_verbose);
                    measurement.error_op = error.op.clone();
                }
                None => measurement.error_op = OP_SUCCESS.to_string(),
            }
            report
        }
    }
}
