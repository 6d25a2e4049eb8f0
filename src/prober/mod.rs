//! Connectivity probes.
//!
//! A [`Prober`] dials a relay through a transport and reports what happened.
//! [`ExternalProber`] runs the outline-sdk `test-connectivity` tool.

mod external;
mod report;

use async_trait::async_trait;

use crate::error_handling::ProbeError;
use crate::models::Protocol;

pub use external::ExternalProber;
pub use report::{ConnectionReport, ConnectivityReport, DnsReport, ReportError, TestReport};

#[async_trait]
pub trait Prober: Send + Sync {
    /// Probes `domain` through `transport` over `protocol`.
    ///
    /// `Ok` with an error inside the report means the probe ran and the target
    /// failed; `Err` means the probe could not be run.
    async fn probe(
        &self,
        transport: &str,
        protocol: Protocol,
        resolver: &str,
        domain: &str,
    ) -> Result<ConnectivityReport, ProbeError>;
}
