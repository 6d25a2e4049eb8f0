//! Proxy providers.
//!
//! A [`Provider`] hands out clients (leased proxy egress points) and knows how
//! to reach the relay servers through them:
//! - [`SoaxProvider`]: SOAX residential and mobile packages
//! - [`ProxyRackProvider`]: ProxyRack residential proxies
//! - [`DirectProvider`]: no proxy, the local machine is the client
//!
//! Use [`new_provider`] to build one from configuration.

mod checker;
mod direct;
mod ipinfo;
mod lease;
mod proxyrack;
mod soax;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error_handling::ProviderError;
use crate::models::{Client, NetworkType};

pub use checker::{parse_checker_body, CheckerResponse, EgressChecker, EgressInfo, HttpChecker};
pub use direct::{DirectProvider, DIRECT_ISP};
pub use ipinfo::{parse_org, IpInfo, IpInfoClient, IpInfoConfig};
pub use proxyrack::ProxyRackProvider;
pub use soax::SoaxProvider;

/// Source of measurement clients.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Name used for client rows and allowed-port lookups.
    fn name(&self) -> &str;

    /// ISPs available in `country`, in vendor order.
    async fn list_isps(
        &self,
        country: &str,
        network_type: NetworkType,
    ) -> Result<Vec<String>, ProviderError>;

    /// Leases one client for `isp`, making at most `max_retries` attempts.
    ///
    /// Returns [`ProviderError::NotAvailable`] when the vendor has no egress
    /// node for the ISP.
    async fn lease_client(
        &self,
        isp: &str,
        network_type: NetworkType,
        country: &str,
        max_retries: usize,
    ) -> Result<Client, ProviderError>;

    /// Proxy transport for the client; empty when connecting directly.
    fn build_transport(&self, client: &Client) -> String;

    /// `Ok(false)` when the client's egress IP is no longer the one it was
    /// leased with. `Err` means the check itself failed.
    async fn validate(&self, client: &Client) -> Result<bool, ProviderError>;

    fn max_concurrency(&self) -> usize;

    fn session_length(&self) -> Duration;
}

/// Supported proxy systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum ProxySystem {
    #[value(name = "soax")]
    Soax,
    #[value(name = "proxyrack")]
    ProxyRack,
    /// No proxy.
    #[value(name = "none")]
    Direct,
}

impl ProxySystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxySystem::Soax => "soax",
            ProxySystem::ProxyRack => "proxyrack",
            ProxySystem::Direct => "none",
        }
    }
}

impl fmt::Display for ProxySystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProxySystem {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "soax" => Ok(ProxySystem::Soax),
            "proxyrack" => Ok(ProxySystem::ProxyRack),
            "none" => Ok(ProxySystem::Direct),
            other => Err(ProviderError::Unsupported(format!(
                "proxy system '{}': must be 'soax', 'proxyrack' or 'none'",
                other
            ))),
        }
    }
}

/// Settings for one provider, resolved for a network type.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub system: ProxySystem,
    pub api_key: String,
    /// ProxyRack account name.
    pub username: String,
    /// SOAX package for the requested network type.
    pub package_id: String,
    pub package_key: String,
    /// Proxy `host:port`.
    pub endpoint: String,
    pub session_length: Duration,
    pub max_workers: usize,
    /// Base URL of the vendor API.
    pub api_url: String,
    /// IP checker fetched through the proxy to learn the egress address.
    pub checker_url: String,
    pub ipinfo: IpInfoConfig,
}

/// Builds the provider selected by `config.system`.
///
/// Missing credentials are reported as [`ProviderError::Config`]; a mobile
/// request for ProxyRack as [`ProviderError::Unsupported`].
pub fn new_provider(
    config: ProviderConfig,
    network_type: NetworkType,
) -> Result<Arc<dyn Provider>, ProviderError> {
    let provider: Arc<dyn Provider> = match config.system {
        ProxySystem::Soax => Arc::new(SoaxProvider::new(config)?),
        ProxySystem::ProxyRack => Arc::new(ProxyRackProvider::new(config, network_type)?),
        ProxySystem::Direct => Arc::new(DirectProvider::new(config)?),
    };
    log::debug!("Using proxy provider {}", provider.name());
    Ok(provider)
}
