//! ipinfo.io lookups used to enrich clients and servers with ASN and location data.

use serde::Deserialize;

use crate::config::HTTP_TIMEOUT;
use crate::error_handling::ProviderError;
use crate::initialization::init_client;

/// Connection settings for the ipinfo API.
#[derive(Debug, Clone, Default)]
pub struct IpInfoConfig {
    /// API token; requests are sent without one when empty.
    pub token: String,
    pub base_url: String,
}

/// Subset of the ipinfo response that is persisted.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct IpInfo {
    pub ip: String,
    pub hostname: String,
    pub city: String,
    pub region: String,
    pub country: String,
    pub loc: String,
    /// ASN and organization, e.g. `AS44244 Iran Cell Service and Communication Company`.
    pub org: String,
    pub postal: String,
    pub timezone: String,
}

impl IpInfo {
    /// `(as_number, as_org)` parsed from [`IpInfo::org`].
    pub fn as_parts(&self) -> (String, String) {
        parse_org(&self.org)
    }
}

/// Splits an ipinfo `org` field into AS number (without the `AS` prefix) and organization.
///
/// A value without a space is kept whole as the organization.
pub fn parse_org(org: &str) -> (String, String) {
    match org.split_once(' ') {
        Some((asn, name)) => (
            asn.strip_prefix("AS").unwrap_or(asn).to_string(),
            name.to_string(),
        ),
        None => (String::new(), org.to_string()),
    }
}

/// HTTP client for ipinfo lookups.
#[derive(Clone)]
pub struct IpInfoClient {
    http: reqwest::Client,
    config: IpInfoConfig,
}

impl IpInfoClient {
    pub fn new(config: IpInfoConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            http: init_client(HTTP_TIMEOUT)?,
            config,
        })
    }

    /// Looks up `ip`, or the caller's own egress address when `ip` is empty.
    pub async fn lookup(&self, ip: &str) -> Result<IpInfo, ProviderError> {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), ip);
        let mut request = self.http.get(&url);
        if !self.config.token.is_empty() {
            request = request.query(&[("token", self.config.token.as_str())]);
        }

        let info = request
            .send()
            .await?
            .error_for_status()?
            .json::<IpInfo>()
            .await?;
        Ok(info)
    }
}
