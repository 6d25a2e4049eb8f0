//! Egress IP checks through a candidate proxy transport.

use std::error::Error as StdError;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::SOCKS_GENERAL_FAILURE;
use crate::error_handling::ProviderError;
use crate::initialization::init_proxied_client;

/// Body returned by the IP checker service.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CheckerResponse {
    pub status: bool,
    pub reason: String,
    pub data: EgressInfo,
}

/// Egress address and location as seen by the IP checker.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EgressInfo {
    pub carrier: String,
    pub city: String,
    pub country_code: String,
    pub country_name: String,
    pub ip: String,
    pub isp: String,
    pub region: String,
}

/// Reports which egress address a transport currently exits from.
#[async_trait]
pub trait EgressChecker: Send + Sync {
    async fn egress(&self, transport: &str) -> Result<EgressInfo, ProviderError>;
}

/// [`EgressChecker`] that fetches a checker URL through the transport.
pub struct HttpChecker {
    url: String,
    timeout: Duration,
}

impl HttpChecker {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl EgressChecker for HttpChecker {
    async fn egress(&self, transport: &str) -> Result<EgressInfo, ProviderError> {
        let client = init_proxied_client(transport, self.timeout)?;
        let body = client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_checker_body(&body)
    }
}

/// Decodes a checker body; a response without an IP is an error.
pub fn parse_checker_body(body: &str) -> Result<EgressInfo, ProviderError> {
    let response: CheckerResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Decode(e.to_string()))?;
    if response.data.ip.is_empty() {
        return Err(ProviderError::Decode(format!(
            "checker returned no IP (reason: {})",
            response.reason
        )));
    }
    Ok(response.data)
}

/// True when the proxy reported that it has no egress node for the request.
///
/// The SOCKS reply is buried in the source chain of the HTTP error.
pub fn is_socks_general_failure(err: &ProviderError) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if e.to_string().contains(SOCKS_GENERAL_FAILURE) {
            return true;
        }
        current = e.source();
    }
    false
}
