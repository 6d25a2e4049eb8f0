//! Lease and validity logic shared by the proxied providers.
//!
//! A lease attempt picks a random vendor session number, asks the IP checker
//! which address the resulting transport exits from, enriches that address
//! with ipinfo, and accepts it only if it is located in the requested country.

use std::net::IpAddr;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio_retry::strategy::ExponentialBackoff;

use crate::config::{
    MAX_SESSION_NUMBER, RETRY_BASE_MS, RETRY_FACTOR, RETRY_MAX_ATTEMPTS, RETRY_MAX_DELAY_SECS,
};
use crate::error_handling::ProviderError;
use crate::models::{Client, NetworkType};

use super::checker::{is_socks_general_failure, EgressChecker};
use super::ipinfo::IpInfoClient;

/// Parameters of one lease request.
pub(crate) struct LeaseRequest<'a> {
    pub isp: &'a str,
    pub network_type: NetworkType,
    pub country: &'a str,
    pub max_retries: usize,
    /// Proxy system name stored on the client.
    pub proxy: &'a str,
    pub session_length: Duration,
}

/// Leases a client, trying up to `max_retries` random session numbers.
///
/// `build_transport` turns a client template (session number, country and ISP
/// filled in) into the transport string the checker is fetched through.
pub(crate) async fn lease_client<F>(
    checker: &dyn EgressChecker,
    ipinfo: &IpInfoClient,
    request: LeaseRequest<'_>,
    build_transport: F,
) -> Result<Client, ProviderError>
where
    F: Fn(&Client) -> String,
{
    for attempt in 1..=request.max_retries {
        let session_id = rand::rng().random_range(0..MAX_SESSION_NUMBER);
        let template = client_template(&request, session_id);
        let transport = build_transport(&template);

        let egress = match checker.egress(&transport).await {
            Ok(egress) => egress,
            Err(e) if is_socks_general_failure(&e) => {
                log::info!("No available nodes for ISP {}", request.isp);
                return Err(ProviderError::NotAvailable {
                    isp: request.isp.to_string(),
                });
            }
            Err(e) => {
                log::debug!(
                    "Lease attempt {}/{} for ISP {} failed: {}",
                    attempt,
                    request.max_retries,
                    request.isp,
                    e
                );
                continue;
            }
        };

        let info = match ipinfo.lookup(&egress.ip).await {
            Ok(info) => info,
            Err(e) => {
                log::debug!("ipinfo lookup for {} failed: {}", egress.ip, e);
                continue;
            }
        };

        // the egress can sit behind the subscriber's own VPN
        if !egress.country_code.eq_ignore_ascii_case(request.country) {
            log::debug!(
                "IP {} is in {} instead of {}, retrying",
                egress.ip,
                egress.country_code,
                request.country
            );
            continue;
        }

        let (as_number, as_org) = info.as_parts();
        let city = if egress.city.is_empty() {
            info.city
        } else {
            egress.city
        };
        let now = Utc::now();

        return Ok(Client {
            ip_version: ip_version(&egress.ip).to_string(),
            ip: egress.ip,
            carrier: egress.carrier,
            city,
            country_code: egress.country_code,
            country_name: egress.country_name,
            as_number,
            as_org,
            created_at: now,
            expiration_time: now + chrono::Duration::seconds(request.session_length.as_secs() as i64),
            last_seen: now,
            ..template
        });
    }

    Err(ProviderError::LeaseExhausted {
        isp: request.isp.to_string(),
        attempts: request.max_retries,
    })
}

/// Checks that `transport` still exits from the address the client was leased with.
pub(crate) async fn validate_client(
    checker: &dyn EgressChecker,
    client: &Client,
    transport: &str,
) -> Result<bool, ProviderError> {
    let egress = checker.egress(transport).await?;
    if egress.ip != client.ip {
        log::info!(
            "Client {} IP changed from {} to {} (session {})",
            client.id,
            client.ip,
            egress.ip,
            client.session_id
        );
        return Ok(false);
    }
    Ok(true)
}

/// Backoff used for vendor ISP list requests.
pub(crate) fn retry_strategy() -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(RETRY_BASE_MS)
        .factor(RETRY_FACTOR)
        .max_delay(Duration::from_secs(RETRY_MAX_DELAY_SECS))
        .take(RETRY_MAX_ATTEMPTS)
}

/// Timeouts, connection failures and 5xx responses are worth another try.
pub(crate) fn is_transient(err: &reqwest::Error) -> bool {
    if let Some(status) = err.status() {
        return status.is_server_error() || status.as_u16() == 429;
    }
    err.is_timeout() || err.is_connect() || err.is_request()
}

/// Percent-encodes an ISP name for embedding in a transport user name.
pub(crate) fn encode_isp(isp: &str) -> String {
    url::form_urlencoded::byte_serialize(isp.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

pub(crate) fn ip_version(ip: &str) -> &'static str {
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(_)) => "v4",
        Ok(IpAddr::V6(_)) => "v6",
        Err(_) => "unknown",
    }
}

fn client_template(request: &LeaseRequest<'_>, session_id: u32) -> Client {
    let now = Utc::now();
    Client {
        id: 0,
        ip: String::new(),
        network_type: request.network_type,
        session_id,
        session_length_secs: request.session_length.as_secs(),
        created_at: now,
        expiration_time: now,
        ip_version: String::new(),
        carrier: String::new(),
        city: String::new(),
        country_code: request.country.to_string(),
        country_name: String::new(),
        as_number: String::new(),
        as_org: String::new(),
        isp: request.isp.to_string(),
        proxy: request.proxy.to_string(),
        last_seen: now,
    }
}
