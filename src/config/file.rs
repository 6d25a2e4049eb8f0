//! YAML configuration file loading.
//!
//! The file is looked up in, in order:
//! - `./config.yaml`
//! - `$HOME/.connectivity-tester/config.yaml`
//! - `/etc/connectivity-tester/config.yaml`
//!
//! Every section is optional. Durations use humantime syntax (`10s`, `6m`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::constants::{
    DB_PATH, DEFAULT_CHECKER_URL, DEFAULT_IPINFO_URL, DEFAULT_MAX_WORKERS,
    DEFAULT_MONITOR_INTERVAL, DEFAULT_PROBER_COMMAND, DEFAULT_PROBE_DOMAIN, DEFAULT_PROBE_TIMEOUT,
    DEFAULT_PROXYRACK_API_URL, DEFAULT_PROXYRACK_SESSION_LENGTH_SECS, DEFAULT_RESOLVER_ADDRESS,
    DEFAULT_SHUTDOWN_GRACE, DEFAULT_SOAX_API_URL, DEFAULT_SOAX_SESSION_LENGTH_SECS,
    DIRECT_SESSION_LENGTH_SECS,
};
use crate::config::types::MeasurementConfig;
use crate::error_handling::ConfigError;
use crate::models::NetworkType;
use crate::provider::{IpInfoConfig, ProviderConfig, ProxySystem};

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub connectivity: ConnectivitySettings,

    #[serde(default)]
    pub measurement: MeasurementSettings,

    #[serde(default)]
    pub ipinfo: IpInfoSettings,

    #[serde(default)]
    pub soax: SoaxSettings,

    #[serde(default)]
    pub proxyrack: ProxyRackSettings,

    #[serde(default)]
    pub none: DirectSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    pub path: PathBuf,
}

/// Prober settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivitySettings {
    pub resolver: String,
    pub domain: String,
    pub prober_command: String,
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementSettings {
    pub prefixes: Vec<String>,
    #[serde(with = "humantime_serde")]
    pub monitor_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IpInfoSettings {
    pub token: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SoaxSettings {
    pub api_key: String,
    pub residential_package_id: String,
    pub residential_package_key: String,
    pub mobile_package_id: String,
    pub mobile_package_key: String,
    pub endpoint: String,
    #[serde(with = "humantime_serde")]
    pub session_length: Duration,
    pub max_workers: usize,
    pub allowed_ports: Vec<u16>,
    pub api_url: String,
    pub checker_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyRackSettings {
    pub username: String,
    pub api_key: String,
    pub endpoint: String,
    #[serde(with = "humantime_serde")]
    pub session_length: Duration,
    pub max_workers: usize,
    pub allowed_ports: Vec<u16>,
    pub api_url: String,
    pub checker_url: String,
}

/// Settings for measurements without a proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectSettings {
    pub max_workers: usize,
    pub allowed_ports: Vec<u16>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DB_PATH),
        }
    }
}

impl Default for ConnectivitySettings {
    fn default() -> Self {
        Self {
            resolver: DEFAULT_RESOLVER_ADDRESS.to_string(),
            domain: DEFAULT_PROBE_DOMAIN.to_string(),
            prober_command: DEFAULT_PROBER_COMMAND.to_string(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl Default for MeasurementSettings {
    fn default() -> Self {
        Self {
            prefixes: Vec::new(),
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl Default for IpInfoSettings {
    fn default() -> Self {
        Self {
            token: String::new(),
            base_url: DEFAULT_IPINFO_URL.to_string(),
        }
    }
}

impl Default for SoaxSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            residential_package_id: String::new(),
            residential_package_key: String::new(),
            mobile_package_id: String::new(),
            mobile_package_key: String::new(),
            endpoint: String::new(),
            session_length: Duration::from_secs(DEFAULT_SOAX_SESSION_LENGTH_SECS),
            max_workers: DEFAULT_MAX_WORKERS,
            allowed_ports: Vec::new(),
            api_url: DEFAULT_SOAX_API_URL.to_string(),
            checker_url: DEFAULT_CHECKER_URL.to_string(),
        }
    }
}

impl Default for ProxyRackSettings {
    fn default() -> Self {
        Self {
            username: String::new(),
            api_key: String::new(),
            endpoint: String::new(),
            session_length: Duration::from_secs(DEFAULT_PROXYRACK_SESSION_LENGTH_SECS),
            max_workers: DEFAULT_MAX_WORKERS,
            allowed_ports: Vec::new(),
            api_url: DEFAULT_PROXYRACK_API_URL.to_string(),
            checker_url: DEFAULT_CHECKER_URL.to_string(),
        }
    }
}

impl Default for DirectSettings {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            allowed_ports: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default search paths, falling back to defaults.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find_config_file() {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(&path)
            }
            None => {
                log::info!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: AppConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    fn find_config_file() -> Option<PathBuf> {
        let mut paths = vec![PathBuf::from("./config.yaml")];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".connectivity-tester/config.yaml"));
        }
        paths.push(PathBuf::from("/etc/connectivity-tester/config.yaml"));

        paths.into_iter().find(|p| p.is_file())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.measurement.monitor_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "measurement.monitor_interval must be greater than zero".to_string(),
            ));
        }
        if self.connectivity.probe_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "connectivity.probe_timeout must be greater than zero".to_string(),
            ));
        }
        if self.connectivity.resolver.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "connectivity.resolver must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds the engine configuration from the `connectivity`, `measurement`
    /// and per-provider `allowed_ports` settings.
    pub fn measurement_config(&self) -> MeasurementConfig {
        let mut allowed_ports_by_provider = HashMap::new();
        for (system, ports) in [
            (ProxySystem::Soax, &self.soax.allowed_ports),
            (ProxySystem::ProxyRack, &self.proxyrack.allowed_ports),
            (ProxySystem::Direct, &self.none.allowed_ports),
        ] {
            if !ports.is_empty() {
                allowed_ports_by_provider.insert(
                    system.as_str().to_string(),
                    ports.iter().map(u16::to_string).collect(),
                );
            }
        }

        MeasurementConfig {
            resolver_address: self.connectivity.resolver.clone(),
            probe_domain: self.connectivity.domain.clone(),
            prefixes: self.measurement.prefixes.clone(),
            allowed_ports_by_provider,
            monitor_interval: self.measurement.monitor_interval,
            shutdown_grace: self.measurement.shutdown_grace,
        }
    }

    pub fn ipinfo_config(&self) -> IpInfoConfig {
        IpInfoConfig {
            token: self.ipinfo.token.clone(),
            base_url: self.ipinfo.base_url.clone(),
        }
    }

    /// Provider settings for `system`, picking the package matching `network_type`.
    pub fn provider_config(&self, system: ProxySystem, network_type: NetworkType) -> ProviderConfig {
        let ipinfo = self.ipinfo_config();
        match system {
            ProxySystem::Soax => {
                let (package_id, package_key) = match network_type {
                    NetworkType::Residential => (
                        &self.soax.residential_package_id,
                        &self.soax.residential_package_key,
                    ),
                    NetworkType::Mobile => {
                        (&self.soax.mobile_package_id, &self.soax.mobile_package_key)
                    }
                };
                ProviderConfig {
                    system,
                    api_key: self.soax.api_key.clone(),
                    username: String::new(),
                    package_id: package_id.clone(),
                    package_key: package_key.clone(),
                    endpoint: self.soax.endpoint.clone(),
                    session_length: self.soax.session_length,
                    max_workers: self.soax.max_workers,
                    api_url: self.soax.api_url.clone(),
                    checker_url: self.soax.checker_url.clone(),
                    ipinfo,
                }
            }
            ProxySystem::ProxyRack => ProviderConfig {
                system,
                api_key: self.proxyrack.api_key.clone(),
                username: self.proxyrack.username.clone(),
                package_id: String::new(),
                package_key: String::new(),
                endpoint: self.proxyrack.endpoint.clone(),
                session_length: self.proxyrack.session_length,
                max_workers: self.proxyrack.max_workers,
                api_url: self.proxyrack.api_url.clone(),
                checker_url: self.proxyrack.checker_url.clone(),
                ipinfo,
            },
            ProxySystem::Direct => ProviderConfig {
                system,
                api_key: String::new(),
                username: String::new(),
                package_id: String::new(),
                package_key: String::new(),
                endpoint: String::new(),
                session_length: Duration::from_secs(DIRECT_SESSION_LENGTH_SECS),
                max_workers: self.none.max_workers,
                api_url: String::new(),
                checker_url: String::new(),
                ipinfo,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.database.path, PathBuf::from(DB_PATH));
    }

    #[test]
    fn test_full_yaml_parsing() {
        let yaml = r#"
database:
  path: /tmp/measurements.db

connectivity:
  resolver: 1.1.1.1:53
  domain: example.com
  probe_timeout: 20s

measurement:
  prefixes: ["%16%03%01%40%00%01", "POST%20"]
  monitor_interval: 15s

ipinfo:
  token: secret

soax:
  api_key: api
  residential_package_id: "111"
  residential_package_key: res-key
  mobile_package_id: "222"
  mobile_package_key: mob-key
  endpoint: proxy.soax.com:5000
  session_length: 6m
  max_workers: 4
  allowed_ports: [443, 8388]
"#;

        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.database.path, PathBuf::from("/tmp/measurements.db"));
        assert_eq!(config.connectivity.probe_timeout, Duration::from_secs(20));
        assert_eq!(config.connectivity.prober_command, DEFAULT_PROBER_COMMAND);
        assert_eq!(config.measurement.prefixes.len(), 2);
        assert_eq!(config.measurement.shutdown_grace, DEFAULT_SHUTDOWN_GRACE);
        assert_eq!(config.soax.session_length, Duration::from_secs(360));
        assert_eq!(config.soax.checker_url, DEFAULT_CHECKER_URL);
        assert_eq!(config.proxyrack.max_workers, DEFAULT_MAX_WORKERS);
    }

    #[test]
    fn test_measurement_config_from_file() {
        let yaml = r#"
connectivity:
  resolver: 9.9.9.9:53
measurement:
  prefixes: ["HTTP/1.1%20"]
  monitor_interval: 2s
soax:
  allowed_ports: [443]
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        let measurement = config.measurement_config();

        assert_eq!(measurement.resolver_address, "9.9.9.9:53");
        assert_eq!(measurement.prefixes, vec!["HTTP/1.1%20".to_string()]);
        assert_eq!(measurement.monitor_interval, Duration::from_secs(2));
        assert_eq!(measurement.allowed_ports("soax"), ["443"]);
        assert!(measurement.allowed_ports("proxyrack").is_empty());
    }

    #[test]
    fn test_provider_config_picks_package_by_network_type() {
        let mut config = AppConfig::default();
        config.soax.residential_package_id = "res".to_string();
        config.soax.mobile_package_id = "mob".to_string();

        let residential = config.provider_config(ProxySystem::Soax, NetworkType::Residential);
        let mobile = config.provider_config(ProxySystem::Soax, NetworkType::Mobile);
        assert_eq!(residential.package_id, "res");
        assert_eq!(mobile.package_id, "mob");

        let direct = config.provider_config(ProxySystem::Direct, NetworkType::Residential);
        assert_eq!(
            direct.session_length,
            Duration::from_secs(DIRECT_SESSION_LENGTH_SECS)
        );
    }

    #[test]
    fn test_zero_monitor_interval_is_rejected() {
        let yaml = r#"
measurement:
  monitor_interval: 0s
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "ipinfo:\n  token: abc\n").unwrap();

        let config = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(config.ipinfo.token, "abc");
        assert_eq!(config.ipinfo.base_url, DEFAULT_IPINFO_URL);
    }

    #[test]
    fn test_load_missing_file() {
        let result = AppConfig::load_from_file("/nonexistent/config.yaml");
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }
}
