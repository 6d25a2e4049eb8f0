//! Direct measurements without a proxy.
//!
//! The local machine is the only client: one pseudo ISP, no transport, and a
//! session that never becomes invalid.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::config::DIRECT_SESSION_LENGTH_SECS;
use crate::error_handling::ProviderError;
use crate::models::{Client, NetworkType};

use super::ipinfo::IpInfoClient;
use super::lease::ip_version;
use super::{Provider, ProviderConfig};

/// ISP name reported for the local connection.
pub const DIRECT_ISP: &str = "Default";

pub struct DirectProvider {
    ipinfo: IpInfoClient,
    max_workers: usize,
}

impl DirectProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            ipinfo: IpInfoClient::new(config.ipinfo)?,
            max_workers: config.max_workers,
        })
    }
}

#[async_trait]
impl Provider for DirectProvider {
    fn name(&self) -> &str {
        "none"
    }

    async fn list_isps(
        &self,
        _country: &str,
        _network_type: NetworkType,
    ) -> Result<Vec<String>, ProviderError> {
        Ok(vec![DIRECT_ISP.to_string()])
    }

    /// Describes the local egress. Retries and country are irrelevant here.
    async fn lease_client(
        &self,
        isp: &str,
        network_type: NetworkType,
        _country: &str,
        _max_retries: usize,
    ) -> Result<Client, ProviderError> {
        let info = self.ipinfo.lookup("").await?;
        let (as_number, as_org) = info.as_parts();
        let now = Utc::now();

        Ok(Client {
            id: 0,
            ip_version: ip_version(&info.ip).to_string(),
            ip: info.ip,
            network_type,
            session_id: 1,
            session_length_secs: DIRECT_SESSION_LENGTH_SECS,
            created_at: now,
            expiration_time: now + chrono::Duration::seconds(DIRECT_SESSION_LENGTH_SECS as i64),
            carrier: String::new(),
            city: info.city,
            country_code: info.country,
            country_name: String::new(),
            isp: if as_org.is_empty() {
                isp.to_string()
            } else {
                as_org.clone()
            },
            as_number,
            as_org,
            proxy: self.name().to_string(),
            last_seen: now,
        })
    }

    fn build_transport(&self, _client: &Client) -> String {
        String::new()
    }

    async fn validate(&self, _client: &Client) -> Result<bool, ProviderError> {
        Ok(true)
    }

    fn max_concurrency(&self) -> usize {
        self.max_workers.max(1)
    }

    fn session_length(&self) -> Duration {
        Duration::from_secs(DIRECT_SESSION_LENGTH_SECS)
    }
}
