//! Configuration constants.
//!
//! Defaults used when neither the configuration file nor the command line
//! provides a value.

use std::time::Duration;

/// Default SQLite database path.
pub const DB_PATH: &str = "./connectivity_tester.db";

/// Interval between two validity checks of a leased client.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(10);

/// How long shutdown waits for session monitors to exit before giving up on them.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Default DNS resolver handed to the prober.
pub const DEFAULT_RESOLVER_ADDRESS: &str = "8.8.8.8:53";

/// Default domain resolved through the relay during a probe.
pub const DEFAULT_PROBE_DOMAIN: &str = "www.google.com";

// Prober
/// Name of the external connectivity test binary.
pub const DEFAULT_PROBER_COMMAND: &str = "test-connectivity";
/// Upper bound for a single probe, including process startup.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

// Provider defaults
/// SOAX lease length when none is configured (6 minutes).
pub const DEFAULT_SOAX_SESSION_LENGTH_SECS: u64 = 360;
/// ProxyRack lease length when none is configured.
pub const DEFAULT_PROXYRACK_SESSION_LENGTH_SECS: u64 = 360;
/// Direct mode has no lease; the client is considered valid for a day.
pub const DIRECT_SESSION_LENGTH_SECS: u64 = 86_400;
/// Worker budget used when the provider configuration does not set one.
pub const DEFAULT_MAX_WORKERS: usize = 10;
/// Servers probed at once by `test-servers`.
pub const DEFAULT_RETEST_CONCURRENCY: usize = 1;
/// Session numbers are drawn uniformly from `0..MAX_SESSION_NUMBER`.
pub const MAX_SESSION_NUMBER: u32 = 1_000_000;

// HTTP
/// Timeout for vendor API, IP checker and ipinfo requests.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout for establishing the TCP connection of an HTTP request.
pub const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_USER_AGENT: &str = concat!("connectivity_tester/", env!("CARGO_PKG_VERSION"));

// Vendor endpoints
pub const DEFAULT_CHECKER_URL: &str = "https://checker.soax.com/api/ipinfo";
pub const DEFAULT_SOAX_API_URL: &str = "https://api.soax.com";
pub const DEFAULT_PROXYRACK_API_URL: &str = "http://api.proxyrack.net";
pub const DEFAULT_IPINFO_URL: &str = "https://ipinfo.io";

/// Substring of the checker error that means the vendor has no node for the ISP.
pub const SOCKS_GENERAL_FAILURE: &str = "general SOCKS server failure";

// Network operation timeouts
/// DNS query timeout in seconds (server import)
pub const DNS_TIMEOUT_SECS: u64 = 3;
/// DNS retry attempts (server import)
pub const DNS_ATTEMPTS: usize = 2;

/// Maximum error message length stored per measurement.
pub const MAX_ERROR_MESSAGE_LENGTH: usize = 2000;

// Retry strategy for vendor API calls (ISP lists)
/// Base of the exponential backoff; the first delay is `RETRY_BASE_MS * RETRY_FACTOR`.
pub const RETRY_BASE_MS: u64 = 2;
pub const RETRY_FACTOR: u64 = 250;
pub const RETRY_MAX_DELAY_SECS: u64 = 5;
/// Number of retries after the initial attempt.
pub const RETRY_MAX_ATTEMPTS: usize = 3;
