//! Configuration types.
//!
//! This module defines the enums used for command-line parsing and the explicit
//! configuration struct handed to the measurement engine.

use std::collections::HashMap;
use std::time::Duration;

use clap::ValueEnum;

use crate::config::constants::{
    DEFAULT_MONITOR_INTERVAL, DEFAULT_PROBE_DOMAIN, DEFAULT_RESOLVER_ADDRESS,
    DEFAULT_SHUTDOWN_GRACE,
};

/// Value of `--log-level`. Applies to this crate; dependencies are capped lower.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        use log::LevelFilter as F;
        match level {
            LogLevel::Error => F::Error,
            LogLevel::Warn => F::Warn,
            LogLevel::Info => F::Info,
            LogLevel::Debug => F::Debug,
            LogLevel::Trace => F::Trace,
        }
    }
}

/// Value of `--log-format`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Coloured lines for a terminal.
    Plain,
    /// One JSON object per line.
    Json,
}

/// Settings the measurement engine reads during a run.
///
/// Built once by the caller (usually from the YAML file) and passed to
/// [`MeasurementEngine::new`](crate::MeasurementEngine::new). The engine never
/// consults any other configuration source.
#[derive(Debug, Clone)]
pub struct MeasurementConfig {
    /// DNS resolver address handed to the prober (`host:port`).
    pub resolver_address: String,

    /// Domain the prober resolves through the relay.
    pub probe_domain: String,

    /// Obfuscation prefixes tried on failed TCP probes, in order.
    pub prefixes: Vec<String>,

    /// Ports a "working" server may listen on, keyed by provider name.
    /// A provider without an entry (or with an empty list) accepts every port.
    pub allowed_ports_by_provider: HashMap<String, Vec<String>>,

    /// Interval between two validity checks of a leased client.
    pub monitor_interval: Duration,

    /// How long `shutdown` waits for session monitors.
    pub shutdown_grace: Duration,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            resolver_address: DEFAULT_RESOLVER_ADDRESS.to_string(),
            probe_domain: DEFAULT_PROBE_DOMAIN.to_string(),
            prefixes: Vec::new(),
            allowed_ports_by_provider: HashMap::new(),
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl MeasurementConfig {
    /// Allowed ports for `provider`, or an empty slice when every port is allowed.
    pub fn allowed_ports(&self, provider: &str) -> &[String] {
        self.allowed_ports_by_provider
            .get(provider)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
