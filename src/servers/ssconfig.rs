//! `ssconfig://` dynamic access keys.
//!
//! The link is fetched over HTTPS. The body is either a plain `ss://` link or
//! a JSON Shadowsocks configuration that is converted into one.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use serde::Deserialize;

use crate::error_handling::ImportError;

pub const SSCONFIG_SCHEME: &str = "ssconfig://";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SsConfig {
    pub server: String,
    pub server_port: u16,
    pub method: String,
    pub password: String,
    #[serde(default)]
    pub prefix: String,
}

impl SsConfig {
    /// `ss://base64url(method:password)@server:port[?prefix=..]`
    pub fn to_access_link(&self) -> String {
        let user_info = URL_SAFE.encode(format!("{}:{}", self.method, self.password));
        let host = if self.server.contains(':') && !self.server.starts_with('[') {
            format!("[{}]", self.server)
        } else {
            self.server.clone()
        };
        let mut link = format!("ss://{}@{}:{}", user_info, host, self.server_port);
        if !self.prefix.is_empty() {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .append_pair("prefix", &self.prefix)
                .finish();
            link.push('?');
            link.push_str(&query);
        }
        link
    }
}

/// HTTPS URL an `ssconfig://` link is served from.
pub fn fetch_url(link: &str) -> Result<String, ImportError> {
    link.strip_prefix(SSCONFIG_SCHEME)
        .map(|rest| format!("https://{}", rest))
        .ok_or_else(|| ImportError::InvalidLink(format!("{} is not an ssconfig link", link)))
}

/// Access link contained in a fetched ssconfig body.
pub fn access_link_from_body(body: &str) -> Result<String, ImportError> {
    let content = body.trim();
    if content.starts_with("ss://") {
        return Ok(content.to_string());
    }
    let config: SsConfig = serde_json::from_str(content)
        .map_err(|e| ImportError::InvalidSsConfig(e.to_string()))?;
    Ok(config.to_access_link())
}

/// Fetches `url` and extracts the access link.
pub async fn fetch_access_link(http: &reqwest::Client, url: &str) -> Result<String, ImportError> {
    let body = http.get(url).send().await?.error_for_status()?.text().await?;
    access_link_from_body(&body)
}
