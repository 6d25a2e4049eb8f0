//! Core records shared by the providers, the prober, the store and the engine.
//!
//! - [`Client`]: one leased proxy egress point (a measurement vantage point)
//! - [`Server`]: one relay server under test
//! - [`Measurement`]: one persisted probe attempt
//!
//! Timestamps are `chrono::DateTime<Utc>` in memory and milliseconds since the
//! Unix epoch in the database.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operation tag recorded for a clean probe success.
pub const OP_SUCCESS: &str = "success";
/// Operation tag recorded when the prober itself could not run the probe.
pub const OP_FAIL: &str = "fail";
/// Operation tag for errors where the target could not be reached at all.
pub const OP_CONNECT: &str = "connect";

/// Kind of egress network a client is leased from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    Residential,
    Mobile,
}

impl NetworkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkType::Residential => "residential",
            NetworkType::Mobile => "mobile",
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "residential" => Ok(NetworkType::Residential),
            "mobile" => Ok(NetworkType::Mobile),
            other => Err(format!(
                "invalid network type '{other}': must be 'residential' or 'mobile'"
            )),
        }
    }
}

/// Transport protocol a probe is run over.
///
/// [`Protocol::ALL`] is the fixed order used by the initial round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub const ALL: [Protocol; 2] = [Protocol::Tcp, Protocol::Udp];

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }

    /// Whether obfuscation prefixes apply to this protocol (stream protocols only).
    pub fn supports_prefix(&self) -> bool {
        matches!(self, Protocol::Tcp)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            other => Err(format!("invalid protocol '{other}'")),
        }
    }
}

/// A leased proxy egress point.
///
/// `id` is 0 until the client has been persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Client {
    pub id: i64,
    pub ip: String,
    pub network_type: NetworkType,
    /// Vendor lease session number embedded in the transport string.
    pub session_id: u32,
    pub session_length_secs: u64,
    pub created_at: DateTime<Utc>,
    pub expiration_time: DateTime<Utc>,
    pub ip_version: String,
    pub carrier: String,
    pub city: String,
    pub country_code: String,
    pub country_name: String,
    pub as_number: String,
    pub as_org: String,
    pub isp: String,
    /// Name of the proxy system the client was leased from.
    pub proxy: String,
    pub last_seen: DateTime<Utc>,
}

/// A relay server under test.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Server {
    pub id: i64,
    pub ip: String,
    pub port: String,
    pub user_info: String,
    pub full_access_link: String,
    pub scheme: String,
    pub domain_name: String,
    /// Name or group tag used for explicit selection.
    pub name: String,
    pub ip_type: String,
    pub as_number: String,
    pub as_org: String,
    pub city: String,
    pub region: String,
    pub country: String,
    pub last_test_time: Option<DateTime<Utc>>,
    pub tcp_error_msg: String,
    pub tcp_error_op: String,
    pub udp_error_msg: String,
    pub udp_error_op: String,
}

impl Server {
    /// Last known `(message, operation)` for the protocol.
    pub fn last_error(&self, protocol: Protocol) -> (&str, &str) {
        match protocol {
            Protocol::Tcp => (&self.tcp_error_msg, &self.tcp_error_op),
            Protocol::Udp => (&self.udp_error_msg, &self.udp_error_op),
        }
    }

    /// Overwrites the last known error for the protocol. Empty strings clear it.
    pub fn set_last_error(&mut self, protocol: Protocol, msg: &str, op: &str) {
        let (msg_field, op_field) = match protocol {
            Protocol::Tcp => (&mut self.tcp_error_msg, &mut self.tcp_error_op),
            Protocol::Udp => (&mut self.udp_error_msg, &mut self.udp_error_op),
        };
        *msg_field = msg.to_string();
        *op_field = op.to_string();
    }

    /// True when the protocol has a recorded failure other than a plain connect error.
    pub fn has_persistent_failure(&self, protocol: Protocol) -> bool {
        let (msg, op) = self.last_error(protocol);
        !msg.is_empty() && op != OP_CONNECT
    }
}

/// One persisted probe attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub id: i64,
    pub client_id: i64,
    pub server_id: i64,
    pub time: DateTime<Utc>,
    pub protocol: Protocol,
    /// Groups all attempts of one client x server pass.
    pub session_id: String,
    /// 0 for the initial round.
    pub retry_number: u32,
    /// Empty when no prefix was used.
    pub prefix_used: String,
    pub error_msg: String,
    pub error_msg_verbose: String,
    pub error_op: String,
    pub duration_ms: i64,
    /// Serialized connectivity report.
    pub full_report: Option<String>,
}

impl Measurement {
    /// A failed attempt has an error message or an operation tag other than "success".
    pub fn is_failure(&self) -> bool {
        !self.error_msg.is_empty() || self.error_op != OP_SUCCESS
    }
}
