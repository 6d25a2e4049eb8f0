//! Prober backed by the `test-connectivity` command line tool.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::{ConnectivitySettings, DEFAULT_PROBER_COMMAND};
use crate::error_handling::ProbeError;
use crate::models::Protocol;
use crate::utils::sanitize::sanitize_and_truncate_error_message;

use super::{ConnectivityReport, Prober};

/// Runs one tool process per probe and parses the JSON report it prints.
///
/// The tool exits non-zero when the target fails but still prints a report, so
/// the exit status only matters when stdout holds no report.
#[derive(Debug, Clone)]
pub struct ExternalProber {
    program: String,
    /// Arguments placed before the probe flags.
    leading_args: Vec<String>,
    timeout: Duration,
}

impl ExternalProber {
    pub fn new(program: impl Into<String>, leading_args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            leading_args,
            timeout,
        }
    }

    /// The configured command is split on whitespace, so a wrapper such as
    /// `go run ./cmd/test-connectivity` works as well as a plain binary.
    pub fn from_settings(settings: &ConnectivitySettings) -> Self {
        let mut parts = settings.prober_command.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_else(|| DEFAULT_PROBER_COMMAND.to_string());
        Self::new(program, parts.collect(), settings.probe_timeout)
    }
}

#[async_trait]
impl Prober for ExternalProber {
    async fn probe(
        &self,
        transport: &str,
        protocol: Protocol,
        resolver: &str,
        domain: &str,
    ) -> Result<ConnectivityReport, ProbeError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.leading_args)
            .arg("-transport")
            .arg(transport)
            .arg("-proto")
            .arg(protocol.as_str())
            .arg("-resolver")
            .arg(resolver)
            .arg("-domain")
            .arg(domain)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout))??;

        let stdout = String::from_utf8_lossy(&output.stdout);
        match serde_json::from_str::<ConnectivityReport>(stdout.trim()) {
            Ok(report) => Ok(report),
            Err(e) if output.status.success() => Err(ProbeError::InvalidReport(e.to_string())),
            Err(_) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let message = format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    stderr.trim()
                );
                Err(ProbeError::Failed(sanitize_and_truncate_error_message(
                    &message,
                )))
            }
        }
    }
}
