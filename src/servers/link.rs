//! Access link parsing and per-address expansion.

use std::net::IpAddr;

use url::Url;

use crate::error_handling::ImportError;
use crate::models::Server;

/// An access link with its fragment removed, split into the parts stored on a server row.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessLink {
    url: Url,
    pub scheme: String,
    pub user_info: String,
    /// Host as written in the link, without IPv6 brackets.
    pub host: String,
    pub port: String,
}

impl AccessLink {
    pub fn parse(link: &str) -> Result<Self, ImportError> {
        let mut url = Url::parse(link.trim())
            .map_err(|e| ImportError::InvalidLink(format!("{}: {}", link, e)))?;
        url.set_fragment(None);

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ImportError::InvalidLink(format!("{}: missing host", link)))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();

        let user_info = match url.password() {
            Some(password) => format!("{}:{}", url.username(), password),
            None => url.username().to_string(),
        };

        Ok(Self {
            scheme: url.scheme().to_string(),
            user_info,
            port: url.port().map(|p| p.to_string()).unwrap_or_default(),
            host,
            url,
        })
    }

    /// The host when it is an IP literal.
    pub fn host_ip(&self) -> Option<IpAddr> {
        self.host.parse().ok()
    }

    /// The link without its fragment.
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Link with the host replaced by `ip`.
    pub fn with_ip(&self, ip: IpAddr) -> Result<String, ImportError> {
        let mut url = self.url.clone();
        let host = match ip {
            IpAddr::V4(v4) => v4.to_string(),
            IpAddr::V6(v6) => format!("[{}]", v6),
        };
        url.set_host(Some(&host))
            .map_err(|e| ImportError::InvalidLink(format!("{}: {}", self.as_str(), e)))?;
        Ok(url.to_string())
    }

    /// One server row per address. The domain name is kept when the link named a host.
    pub fn to_servers(&self, ips: &[IpAddr], name: &str) -> Result<Vec<Server>, ImportError> {
        let domain_name = if self.host_ip().is_some() {
            String::new()
        } else {
            self.host.clone()
        };

        ips.iter()
            .map(|ip| {
                Ok(Server {
                    ip: ip.to_string(),
                    port: self.port.clone(),
                    user_info: self.user_info.clone(),
                    full_access_link: self.with_ip(*ip)?,
                    scheme: self.scheme.clone(),
                    domain_name: domain_name.clone(),
                    name: name.to_string(),
                    ip_type: match ip {
                        IpAddr::V4(_) => "v4".to_string(),
                        IpAddr::V6(_) => "v6".to_string(),
                    },
                    ..Server::default()
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ip_link_strips_fragment() {
        let link = AccessLink::parse("ss://Y2hhY2hhMjA6cHc@192.0.2.10:8388/?outline=1#My%20Server").unwrap();
        assert_eq!(link.scheme, "ss");
        assert_eq!(link.user_info, "Y2hhY2hhMjA6cHc");
        assert_eq!(link.host, "192.0.2.10");
        assert_eq!(link.port, "8388");
        assert_eq!(link.host_ip(), Some("192.0.2.10".parse().unwrap()));
        assert_eq!(link.as_str(), "ss://Y2hhY2hhMjA6cHc@192.0.2.10:8388/?outline=1");

        let servers = link.to_servers(&[link.host_ip().unwrap()], "").unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].full_access_link, link.as_str());
        assert_eq!(servers[0].domain_name, "");
        assert_eq!(servers[0].ip_type, "v4");
    }

    #[test]
    fn test_user_and_password() {
        let link = AccessLink::parse("ss://user:pass@192.168.1.1:8388").unwrap();
        assert_eq!(link.user_info, "user:pass");
    }

    #[test]
    fn test_host_is_expanded_per_address() {
        let link = AccessLink::parse("ss://key@relay.example.org:443?prefix=POST").unwrap();
        assert_eq!(link.host_ip(), None);

        let ips: Vec<IpAddr> = vec!["203.0.113.4".parse().unwrap(), "2001:db8::7".parse().unwrap()];
        let servers = link.to_servers(&ips, "fleet-a").unwrap();

        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].full_access_link, "ss://key@203.0.113.4:443?prefix=POST");
        assert_eq!(servers[1].full_access_link, "ss://key@[2001:db8::7]:443?prefix=POST");
        assert_eq!(servers[1].ip, "2001:db8::7");
        assert_eq!(servers[1].ip_type, "v6");
        assert!(servers.iter().all(|s| s.domain_name == "relay.example.org"));
        assert!(servers.iter().all(|s| s.name == "fleet-a"));
        assert!(servers.iter().all(|s| s.port == "443"));
    }

    #[test]
    fn test_invalid_links() {
        assert!(matches!(
            AccessLink::parse("invalid-url"),
            Err(ImportError::InvalidLink(_))
        ));
        assert!(matches!(
            AccessLink::parse("ss:opaque"),
            Err(ImportError::InvalidLink(_))
        ));
    }
}
