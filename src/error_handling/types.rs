//! Error type definitions.
//!
//! This module defines all error, counter and info types used throughout the application.

use std::time::Duration;

use log::SetLoggerError;
use reqwest::Error as ReqwestError;
use strum_macros::EnumIter as EnumIterMacro;
use thiserror::Error;

/// Error types for initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)] // All variants end with "Error" by convention
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),

    /// Error initializing the HTTP client.
    #[error("HTTP client initialization error: {0}")]
    HttpClientError(#[from] ReqwestError),

    /// Error initializing the DNS resolver.
    #[error("DNS resolver initialization error: {0}")]
    DnsResolverError(String),
}

/// Error types for database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error creating the database file.
    #[error("Database file creation error: {0}")]
    FileCreationError(String),

    /// SQL execution error.
    #[error("SQL error: {0}")]
    SqlError(#[from] sqlx::Error),

    /// Applying schema migrations failed.
    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    /// The requested rows do not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A stored value could not be decoded into a model.
    #[error("Invalid stored value: {0}")]
    InvalidValue(String),
}

impl DatabaseError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DatabaseError::NotFound(_) | DatabaseError::SqlError(sqlx::Error::RowNotFound)
        )
    }
}

/// Error types for configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found in search paths")]
    FileNotFound,

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Error types reported by proxy providers.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The vendor has no egress nodes for this ISP right now.
    #[error("no available nodes for ISP {isp}")]
    NotAvailable { isp: String },

    /// Every lease attempt produced an unusable client.
    #[error("failed to get client for ISP {isp} after {attempts} attempts")]
    LeaseExhausted { isp: String, attempts: usize },

    /// The provider cannot serve this kind of request.
    #[error("unsupported request: {0}")]
    Unsupported(String),

    /// Missing or invalid provider configuration.
    #[error("provider configuration error: {0}")]
    Config(String),

    /// HTTP transport error talking to the vendor or the IP checker.
    #[error("HTTP error: {0}")]
    Http(#[from] ReqwestError),

    /// Response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// Error types for probe execution.
///
/// Any of these means the probe itself could not be run; it is recorded with the
/// "fail" operation tag.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("failed to start prober: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid probe report: {0}")]
    InvalidReport(String),

    #[error("{0}")]
    Failed(String),
}

/// Errors surfaced by the measurement engine.
#[derive(Error, Debug)]
pub enum MeasurementError {
    /// Both server ids and server names were supplied.
    #[error("ambiguous server selection: use either server ids or server names, not both")]
    AmbiguousServerSelection,

    /// An explicitly requested server id or name matched nothing.
    #[error("requested servers not found: {0}")]
    ServersNotFound(String),

    /// No working server is available for the provider.
    #[error("no working servers found for provider {provider}")]
    NoServers { provider: String },

    /// No ISP could be resolved for the country.
    #[error("no ISPs found for country {country}")]
    NoIsps { country: String },

    /// The client session expired before the job ran.
    #[error("client {client_id} session has expired")]
    Expired { client_id: i64 },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Errors raised while importing servers from access links.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("failed to read server list: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid access link: {0}")]
    InvalidLink(String),

    #[error("failed to resolve {host}: {message}")]
    Resolve { host: String, message: String },

    #[error("failed to fetch ssconfig: {0}")]
    Http(#[from] ReqwestError),

    #[error("invalid ssconfig: {0}")]
    InvalidSsConfig(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Counted failure conditions during a measurement run.
///
/// None of these abort the run; they are tallied and printed at the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum ErrorType {
    ClientLeaseError,
    ClientPersistError,
    ClientExpired,
    ProbeDialError,
    ProbeTargetError,
    MeasurementPersistError,
    MeasurementReadError,
    ServerUpdateError,
    SessionCheckError,
}

/// Types of informational metrics recorded during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum InfoType {
    ProtocolSkipped,
    BareRetry,
    PrefixRetry,
    ClientInvalidated,
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::ClientLeaseError => "Client lease error",
            ErrorType::ClientPersistError => "Client persist error",
            ErrorType::ClientExpired => "Client expired before job",
            ErrorType::ProbeDialError => "Probe dial error",
            ErrorType::ProbeTargetError => "Probe target error",
            ErrorType::MeasurementPersistError => "Measurement persist error",
            ErrorType::MeasurementReadError => "Measurement read error",
            ErrorType::ServerUpdateError => "Server update error",
            ErrorType::SessionCheckError => "Session check error",
        }
    }
}

impl InfoType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InfoType::ProtocolSkipped => "Protocol skipped (known broken)",
            InfoType::BareRetry => "Bare retry",
            InfoType::PrefixRetry => "Prefix retry",
            InfoType::ClientInvalidated => "Client invalidated",
        }
    }
}
