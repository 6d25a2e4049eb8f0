//! Server import from access link lists.
//!
//! Each non-empty, non-comment line of the input is an access link. Host names
//! are resolved and every address becomes its own server row, enriched with
//! ipinfo data and upserted on the access link. A bad line is logged and
//! skipped; only an unreadable input file fails the import.

mod link;
mod retest;
mod ssconfig;

use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;

use crate::error_handling::ImportError;
use crate::models::Server;
use crate::provider::IpInfoClient;
use crate::storage::Store;

pub use link::AccessLink;
pub use retest::{RetestSelection, RetestSummary, ServerRetester};
pub use ssconfig::{access_link_from_body, SsConfig, SSCONFIG_SCHEME};

/// Resolves host names of access links.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, ImportError>;
}

#[async_trait]
impl AddressResolver for TokioAsyncResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, ImportError> {
        let lookup = self.lookup_ip(host).await.map_err(|e| ImportError::Resolve {
            host: host.to_string(),
            message: e.to_string(),
        })?;
        Ok(lookup.iter().collect())
    }
}

/// Counts of one import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub links: usize,
    pub servers: usize,
    pub failed_links: usize,
}

pub struct ServerImporter {
    store: Arc<dyn Store>,
    resolver: Arc<dyn AddressResolver>,
    /// Enrichment is skipped when unset.
    ipinfo: Option<IpInfoClient>,
    http: reqwest::Client,
}

impl ServerImporter {
    pub fn new(
        store: Arc<dyn Store>,
        resolver: Arc<dyn AddressResolver>,
        ipinfo: Option<IpInfoClient>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            store,
            resolver,
            ipinfo,
            http,
        }
    }

    /// Imports every link in `path`, tagging the servers with `name` when given.
    pub async fn import_file(
        &self,
        path: &Path,
        name: Option<&str>,
    ) -> Result<ImportSummary, ImportError> {
        let content = tokio::fs::read_to_string(path).await?;
        Ok(self.import_links(content.lines(), name).await)
    }

    pub async fn import_links<'a, I>(&self, lines: I, name: Option<&str>) -> ImportSummary
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut summary = ImportSummary::default();
        for line in lines {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            summary.links += 1;
            match self.import_link(line, name.unwrap_or_default()).await {
                Ok(count) => summary.servers += count,
                Err(e) => {
                    summary.failed_links += 1;
                    log::error!("Failed to import access link: {}", e);
                }
            }
        }
        log::info!(
            "Imported {} servers from {} links ({} failed)",
            summary.servers,
            summary.links,
            summary.failed_links
        );
        summary
    }

    /// Imports one link and returns the number of servers written.
    pub async fn import_link(&self, raw: &str, name: &str) -> Result<usize, ImportError> {
        let raw = if raw.starts_with(SSCONFIG_SCHEME) {
            let url = ssconfig::fetch_url(raw)?;
            ssconfig::fetch_access_link(&self.http, &url).await?
        } else {
            raw.to_string()
        };

        let link = AccessLink::parse(&raw)?;
        let ips = match link.host_ip() {
            Some(ip) => vec![ip],
            None => self.resolver.resolve(&link.host).await?,
        };
        if ips.is_empty() {
            return Err(ImportError::Resolve {
                host: link.host.clone(),
                message: "no addresses".to_string(),
            });
        }

        let servers = link.to_servers(&ips, name)?;
        for mut server in servers.iter().cloned() {
            self.enrich(&mut server).await;
            let id = self.store.upsert_server(&server).await?;
            log::debug!("Upserted server {} ({})", id, server.full_access_link);
        }
        Ok(servers.len())
    }

    async fn enrich(&self, server: &mut Server) {
        let Some(ipinfo) = &self.ipinfo else {
            return;
        };
        match ipinfo.lookup(&server.ip).await {
            Ok(info) => {
                let (as_number, as_org) = info.as_parts();
                server.as_number = as_number;
                server.as_org = as_org;
                server.city = info.city;
                server.region = info.region;
                server.country = info.country;
            }
            Err(e) => log::warn!("ipinfo lookup for {} failed: {}", server.ip, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::test_helpers::MemoryStore;
    use crate::provider::IpInfoConfig;
    use std::collections::HashMap;
    use std::io::Write;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StaticResolver(HashMap<String, Vec<IpAddr>>);

    #[async_trait]
    impl AddressResolver for StaticResolver {
        async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, ImportError> {
            self.0.get(host).cloned().ok_or_else(|| ImportError::Resolve {
                host: host.to_string(),
                message: "NXDOMAIN".to_string(),
            })
        }
    }

    fn resolver() -> Arc<StaticResolver> {
        let mut hosts = HashMap::new();
        hosts.insert(
            "relay.example.org".to_string(),
            vec!["203.0.113.4".parse().unwrap(), "203.0.113.5".parse().unwrap()],
        );
        Arc::new(StaticResolver(hosts))
    }

    fn importer(store: &Arc<MemoryStore>, ipinfo: Option<IpInfoClient>) -> ServerImporter {
        ServerImporter::new(store.clone(), resolver(), ipinfo, reqwest::Client::new())
    }

    #[tokio::test]
    async fn test_import_file_skips_comments_and_bad_lines() {
        let store = Arc::new(MemoryStore::default());
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "# fleet A\n\nss://key@192.0.2.1:443#first\nnot a link\nss://key@relay.example.org:8388\nss://key@unknown.example.org:1"
        )
        .unwrap();

        let summary = importer(&store, None)
            .import_file(file.path(), Some("fleet-a"))
            .await
            .unwrap();

        assert_eq!(
            summary,
            ImportSummary {
                links: 4,
                servers: 3,
                failed_links: 2
            }
        );
        let servers = store.servers();
        assert_eq!(servers.len(), 3);
        assert_eq!(servers[0].full_access_link, "ss://key@192.0.2.1:443");
        assert!(servers.iter().all(|s| s.name == "fleet-a"));
        assert_eq!(servers[2].full_access_link, "ss://key@203.0.113.5:8388");
        assert_eq!(servers[2].domain_name, "relay.example.org");
    }

    #[tokio::test]
    async fn test_reimport_updates_in_place() {
        let store = Arc::new(MemoryStore::default());
        let importer = importer(&store, None);

        importer.import_link("ss://key@192.0.2.1:443", "old").await.unwrap();
        importer.import_link("ss://key@192.0.2.1:443#renamed", "new").await.unwrap();

        let servers = store.servers();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].name, "new");
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let store = Arc::new(MemoryStore::default());
        let result = importer(&store, None)
            .import_file(Path::new("/nonexistent/servers.txt"), None)
            .await;
        assert!(matches!(result, Err(ImportError::Io(_))));
    }

    #[tokio::test]
    async fn test_enrichment_with_ipinfo() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/192.0.2.1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ip": "192.0.2.1",
                "city": "Frankfurt am Main",
                "region": "Hesse",
                "country": "DE",
                "org": "AS24940 Hetzner Online GmbH"
            })))
            .mount(&mock)
            .await;
        let ipinfo = IpInfoClient::new(IpInfoConfig {
            token: String::new(),
            base_url: mock.uri(),
        })
        .unwrap();

        let store = Arc::new(MemoryStore::default());
        importer(&store, Some(ipinfo))
            .import_link("ss://key@192.0.2.1:443", "")
            .await
            .unwrap();

        let server = &store.servers()[0];
        assert_eq!(server.as_number, "24940");
        assert_eq!(server.as_org, "Hetzner Online GmbH");
        assert_eq!(server.region, "Hesse");
        assert_eq!(server.country, "DE");
    }

    #[tokio::test]
    async fn test_ipinfo_failure_still_imports() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock)
            .await;
        let ipinfo = IpInfoClient::new(IpInfoConfig {
            token: String::new(),
            base_url: mock.uri(),
        })
        .unwrap();

        let store = Arc::new(MemoryStore::default());
        let written = importer(&store, Some(ipinfo))
            .import_link("ss://key@192.0.2.1:443", "")
            .await
            .unwrap();
        assert_eq!(written, 1);
        assert_eq!(store.servers()[0].as_org, "");
    }
}
