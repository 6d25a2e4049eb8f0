//! SOAX residential and mobile proxies.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_retry::RetryIf;

use crate::config::HTTP_TIMEOUT;
use crate::error_handling::ProviderError;
use crate::initialization::init_client;
use crate::models::{Client, NetworkType};

use super::checker::{EgressChecker, HttpChecker};
use super::ipinfo::IpInfoClient;
use super::lease::{self, encode_isp, is_transient, retry_strategy, LeaseRequest};
use super::{Provider, ProviderConfig};

pub struct SoaxProvider {
    config: ProviderConfig,
    http: reqwest::Client,
    checker: Arc<dyn EgressChecker>,
    ipinfo: IpInfoClient,
}

impl SoaxProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let checker = Arc::new(HttpChecker::new(config.checker_url.clone(), HTTP_TIMEOUT));
        Self::with_checker(config, checker)
    }

    /// Builds the provider with a custom egress checker.
    pub fn with_checker(
        config: ProviderConfig,
        checker: Arc<dyn EgressChecker>,
    ) -> Result<Self, ProviderError> {
        for (value, name) in [
            (&config.api_key, "soax.api_key"),
            (&config.package_id, "soax package id"),
            (&config.package_key, "soax package key"),
            (&config.endpoint, "soax.endpoint"),
        ] {
            if value.is_empty() {
                return Err(ProviderError::Config(format!("{} is required", name)));
            }
        }

        Ok(Self {
            http: init_client(HTTP_TIMEOUT)?,
            ipinfo: IpInfoClient::new(config.ipinfo.clone())?,
            checker,
            config,
        })
    }

    fn isp_list_request(&self, country: &str, network_type: NetworkType) -> reqwest::RequestBuilder {
        let base = self.config.api_url.trim_end_matches('/');
        let mut query = vec![
            ("api_key", self.config.api_key.as_str()),
            ("package_key", self.config.package_key.as_str()),
            ("country_iso", country),
        ];
        let url = match network_type {
            NetworkType::Residential => {
                query.push(("conn_type", "wifi"));
                format!("{}/api/get-country-isp", base)
            }
            NetworkType::Mobile => format!("{}/api/get-country-operators", base),
        };
        self.http.get(url).query(&query)
    }
}

#[async_trait]
impl Provider for SoaxProvider {
    fn name(&self) -> &str {
        "soax"
    }

    async fn list_isps(
        &self,
        country: &str,
        network_type: NetworkType,
    ) -> Result<Vec<String>, ProviderError> {
        let response = RetryIf::spawn(
            retry_strategy(),
            || async {
                self.isp_list_request(country, network_type)
                    .send()
                    .await?
                    .error_for_status()
            },
            is_transient,
        )
        .await?;

        let isps: Vec<String> = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(format!("ISP list: {}", e)))?;
        log::debug!("SOAX returned {} ISPs for {}", isps.len(), country);
        Ok(isps)
    }

    async fn lease_client(
        &self,
        isp: &str,
        network_type: NetworkType,
        country: &str,
        max_retries: usize,
    ) -> Result<Client, ProviderError> {
        let request = LeaseRequest {
            isp,
            network_type,
            country,
            max_retries,
            proxy: self.name(),
            session_length: self.config.session_length,
        };
        lease::lease_client(self.checker.as_ref(), &self.ipinfo, request, |c| {
            self.build_transport(c)
        })
        .await
    }

    fn build_transport(&self, client: &Client) -> String {
        format!(
            "socks5://package-{}-country-{}-sessionid-{}-sessionlength-{}-isp-{}-opt-uniqip:{}@{}",
            self.config.package_id,
            client.country_code,
            client.session_id,
            client.session_length_secs,
            encode_isp(&client.isp),
            self.config.package_key,
            self.config.endpoint
        )
    }

    async fn validate(&self, client: &Client) -> Result<bool, ProviderError> {
        let transport = self.build_transport(client);
        lease::validate_client(self.checker.as_ref(), client, &transport).await
    }

    fn max_concurrency(&self) -> usize {
        self.config.max_workers.max(1)
    }

    fn session_length(&self) -> Duration {
        self.config.session_length
    }
}
