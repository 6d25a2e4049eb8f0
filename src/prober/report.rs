//! Structured connectivity report.
//!
//! Mirrors the JSON printed by the `test-connectivity` tool. Unknown fields are
//! ignored and missing ones default, so reports from older tool versions still
//! parse.

use serde::{Deserialize, Serialize};

use crate::models::OP_SUCCESS;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectivityReport {
    pub test: TestReport,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_queries: Vec<DnsReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tcp_connections: Vec<ConnectionReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub udp_connections: Vec<ConnectionReport>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestReport {
    pub resolver: String,
    pub proto: String,
    /// RFC 3339 start time as printed by the tool.
    pub time: String,
    pub duration_ms: i64,
    pub error: Option<ReportError>,
}

/// Failure detail of a probe that ran but did not succeed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportError {
    /// Operation that failed (`resolve`, `connect`, `read`, ...).
    #[serde(skip_serializing_if = "String::is_empty")]
    pub op: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub posix_error: String,
    /// Innermost error message.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub msg: String,
    /// Full error chain.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub msg_verbose: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsReport {
    pub query_name: String,
    pub time: String,
    pub duration_ms: i64,
    pub answer_ips: Vec<String>,
    pub error: String,
}

/// One TCP or UDP dial observed during the probe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionReport {
    pub hostname: String,
    pub ip: String,
    pub port: String,
    pub error: String,
    pub time: String,
    pub duration_ms: i64,
}

impl ConnectivityReport {
    /// Report stored when the prober could not run at all.
    pub fn unavailable(resolver: &str, proto: &str) -> Self {
        Self {
            test: TestReport {
                resolver: resolver.to_string(),
                proto: proto.to_string(),
                time: chrono::Utc::now().to_rfc3339(),
                ..TestReport::default()
            },
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.test.error.is_none()
    }

    /// Operation tag of the outcome: the failing operation, or "success".
    pub fn op(&self) -> &str {
        match &self.test.error {
            Some(error) => &error.op,
            None => OP_SUCCESS,
        }
    }
}
