//! Configuration resolution for torshift.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Settings file (`--config` or ~/.config/torshift/settings.json)
//! 3. Environment variables and CLI arguments (resolved by the binary)
//!
//! The resolved [`RotationConfig`] is immutable for the process lifetime.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Rotation interval used when neither the environment nor a settings file sets one.
pub const DEFAULT_INTERVAL_SECS: i64 = 60;

/// Local Tor SOCKS ingress. `socks5h` resolves hostnames through the proxy.
pub const DEFAULT_PROXY: &str = "socks5h://127.0.0.1:9050";

/// Endpoint echoing the caller's apparent address as JSON.
pub const DEFAULT_PROBE_URL: &str = "https://httpbin.org/ip";

/// JSON field holding the address in the probe response.
pub const DEFAULT_ADDRESS_FIELD: &str = "origin";

/// systemd unit of the proxy daemon.
pub const DEFAULT_SERVICE: &str = "tor";

/// Per-attempt timeout of the verification probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Seconds to wait for outstanding restarts on shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Proxy URL scheme accepted by the probe client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyScheme {
    Socks5,
    Socks5h,
    Http,
    Https,
}

impl ProxyScheme {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Socks5 => "socks5",
            Self::Socks5h => "socks5h",
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

/// Local proxy ingress the verification probe is routed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    scheme: ProxyScheme,
    host: String,
    port: u16,
}

impl ProxyEndpoint {
    pub fn new(scheme: ProxyScheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
        }
    }

    pub const fn scheme(&self) -> ProxyScheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl Default for ProxyEndpoint {
    fn default() -> Self {
        Self::new(ProxyScheme::Socks5h, "127.0.0.1", 9050)
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme.as_str(), self.host, self.port)
    }
}

impl FromStr for ProxyEndpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidProxy {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| invalid("expected scheme://host:port"))?;
        let scheme = match scheme.to_ascii_lowercase().as_str() {
            "socks5" => ProxyScheme::Socks5,
            "socks5h" => ProxyScheme::Socks5h,
            "http" => ProxyScheme::Http,
            "https" => ProxyScheme::Https,
            _ => return Err(invalid("unsupported scheme")),
        };

        let rest = rest.trim_end_matches('/');
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| invalid("missing port"))?;
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        let port: u16 = port.parse().map_err(|_| invalid("port is not a number"))?;
        if port == 0 {
            return Err(invalid("port must be non-zero"));
        }

        Ok(Self::new(scheme, host, port))
    }
}

/// Fixed-delay retry budget for the verification probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Constant pause between consecutive attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

/// What the rotation loop does when every verification attempt failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExhaustedPolicy {
    /// Stop the loop and exit with a non-zero status.
    Exit,
    /// Log the failure and keep the rotation schedule.
    #[default]
    Skip,
}

impl FromStr for ExhaustedPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "exit" => Ok(Self::Exit),
            "skip" => Ok(Self::Skip),
            other => Err(Error::Config(format!(
                "unknown exhausted-retry policy '{other}' (expected exit or skip)"
            ))),
        }
    }
}

impl fmt::Display for ExhaustedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Exit => "exit",
            Self::Skip => "skip",
        })
    }
}

/// Whether a verification waits for the preceding restart to finish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartWait {
    /// Restarts run unordered with respect to later verifications.
    #[default]
    Detached,
    /// The next verification waits until outstanding restarts complete.
    Await,
}

impl FromStr for RestartWait {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "detached" => Ok(Self::Detached),
            "await" => Ok(Self::Await),
            other => Err(Error::Config(format!(
                "unknown restart-wait policy '{other}' (expected detached or await)"
            ))),
        }
    }
}

impl fmt::Display for RestartWait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Detached => "detached",
            Self::Await => "await",
        })
    }
}

/// Verification probe settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    pub url: String,
    pub address_field: String,
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_PROBE_URL.to_string(),
            address_field: DEFAULT_ADDRESS_FIELD.to_string(),
            timeout: PROBE_TIMEOUT,
        }
    }
}

/// Fully resolved rotation configuration.
///
/// The interval is private so a constructed config always satisfies
/// `interval > 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationConfig {
    interval: Duration,
    pub proxy: ProxyEndpoint,
    pub probe: ProbeConfig,
    pub retry: RetryPolicy,
    /// systemd unit controlled by the restarter.
    pub service: String,
    pub on_exhausted: ExhaustedPolicy,
    pub restart_wait: RestartWait,
    pub shutdown_timeout: Duration,
}

impl RotationConfig {
    /// Create a config with the given interval and defaults for everything else.
    pub fn new(interval_secs: i64) -> Result<Self> {
        Ok(Self {
            interval: validate_interval(interval_secs)?,
            proxy: ProxyEndpoint::default(),
            probe: ProbeConfig::default(),
            retry: RetryPolicy::default(),
            service: DEFAULT_SERVICE.to_string(),
            on_exhausted: ExhaustedPolicy::default(),
            restart_wait: RestartWait::default(),
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
        })
    }

    pub const fn interval(&self) -> Duration {
        self.interval
    }
}

fn validate_interval(secs: i64) -> Result<Duration> {
    u64::try_from(secs)
        .ok()
        .filter(|&s| s > 0)
        .map(Duration::from_secs)
        .ok_or(Error::InvalidInterval(secs))
}

/// Partial configuration as read from a settings file or the command line.
///
/// Every field is optional; [`Settings::merge`] layers sources and
/// [`Settings::resolve`] fills the gaps with built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub interval_secs: Option<i64>,
    pub proxy: Option<String>,
    pub probe_url: Option<String>,
    pub address_field: Option<String>,
    pub service: Option<String>,
    pub on_exhausted: Option<ExhaustedPolicy>,
    pub restart_wait: Option<RestartWait>,
    pub shutdown_timeout_secs: Option<u64>,
}

impl Settings {
    /// Read settings from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read settings file {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse settings file {}: {}", path.display(), e))
        })
    }

    /// Layer `overlay` on top of `self`; fields set in `overlay` win.
    #[must_use]
    pub fn merge(self, overlay: Self) -> Self {
        Self {
            interval_secs: overlay.interval_secs.or(self.interval_secs),
            proxy: overlay.proxy.or(self.proxy),
            probe_url: overlay.probe_url.or(self.probe_url),
            address_field: overlay.address_field.or(self.address_field),
            service: overlay.service.or(self.service),
            on_exhausted: overlay.on_exhausted.or(self.on_exhausted),
            restart_wait: overlay.restart_wait.or(self.restart_wait),
            shutdown_timeout_secs: overlay.shutdown_timeout_secs.or(self.shutdown_timeout_secs),
        }
    }

    /// Validate and produce the immutable rotation config.
    pub fn resolve(self) -> Result<RotationConfig> {
        let mut config = RotationConfig::new(self.interval_secs.unwrap_or(DEFAULT_INTERVAL_SECS))?;

        if let Some(proxy) = self.proxy {
            config.proxy = proxy.parse()?;
        }
        if let Some(url) = self.probe_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::Config(format!(
                    "probe URL must be http:// or https:// (got '{url}')"
                )));
            }
            config.probe.url = url;
        }
        if let Some(field) = self.address_field {
            if field.is_empty() {
                return Err(Error::Config("address field must not be empty".into()));
            }
            config.probe.address_field = field;
        }
        if let Some(service) = self.service {
            if service.is_empty() {
                return Err(Error::Config("service name must not be empty".into()));
            }
            config.service = service;
        }
        if let Some(policy) = self.on_exhausted {
            config.on_exhausted = policy;
        }
        if let Some(wait) = self.restart_wait {
            config.restart_wait = wait;
        }
        if let Some(secs) = self.shutdown_timeout_secs {
            config.shutdown_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

/// Path of the global settings file.
pub fn global_settings_path() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/torshift/settings.json"))
    }
    #[cfg(not(target_os = "macos"))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("torshift").join("settings.json"))
    }
}

/// Load file-level settings.
///
/// An explicit path must exist. Without one, the global settings file is
/// read when present and an empty [`Settings`] is returned otherwise.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    if let Some(path) = explicit {
        return Settings::from_file(path);
    }
    match global_settings_path() {
        Some(path) if path.exists() => Settings::from_file(&path),
        _ => Ok(Settings::default()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_tor_defaults() {
        let config = RotationConfig::new(DEFAULT_INTERVAL_SECS).unwrap();
        assert_eq!(config.interval(), Duration::from_secs(60));
        assert_eq!(config.proxy.to_string(), DEFAULT_PROXY);
        assert_eq!(config.probe.timeout, Duration::from_secs(10));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.delay, Duration::from_secs(5));
        assert_eq!(config.service, "tor");
        assert_eq!(config.on_exhausted, ExhaustedPolicy::Skip);
        assert_eq!(config.restart_wait, RestartWait::Detached);
    }

    #[test]
    fn zero_interval_rejected() {
        assert!(matches!(
            RotationConfig::new(0),
            Err(Error::InvalidInterval(0))
        ));
    }

    #[test]
    fn negative_interval_rejected() {
        assert!(matches!(
            RotationConfig::new(-5),
            Err(Error::InvalidInterval(-5))
        ));
    }

    #[test]
    fn proxy_endpoint_parses() {
        let proxy: ProxyEndpoint = "socks5://10.0.0.2:9150".parse().unwrap();
        assert_eq!(proxy.scheme(), ProxyScheme::Socks5);
        assert_eq!(proxy.host(), "10.0.0.2");
        assert_eq!(proxy.port(), 9150);
        assert_eq!(proxy.to_string(), "socks5://10.0.0.2:9150");
    }

    #[test]
    fn proxy_endpoint_rejects_garbage() {
        for input in [
            "127.0.0.1:9050",
            "ftp://127.0.0.1:21",
            "socks5h://127.0.0.1",
            "socks5h://:9050",
            "socks5h://127.0.0.1:notaport",
            "socks5h://127.0.0.1:0",
        ] {
            assert!(
                matches!(input.parse::<ProxyEndpoint>(), Err(Error::InvalidProxy { .. })),
                "{input} should be rejected"
            );
        }
    }

    #[test]
    fn policies_parse_case_insensitively() {
        assert_eq!("EXIT".parse::<ExhaustedPolicy>().unwrap(), ExhaustedPolicy::Exit);
        assert_eq!("await".parse::<RestartWait>().unwrap(), RestartWait::Await);
        assert!("sometimes".parse::<RestartWait>().is_err());
    }

    #[test]
    fn overlay_wins_on_merge() {
        let file = Settings {
            interval_secs: Some(120),
            service: Some("tor@default".into()),
            ..Default::default()
        };
        let cli = Settings {
            interval_secs: Some(30),
            ..Default::default()
        };

        let merged = file.merge(cli);
        assert_eq!(merged.interval_secs, Some(30));
        assert_eq!(merged.service.as_deref(), Some("tor@default"));
    }

    #[test]
    fn resolve_applies_every_field() {
        let config = Settings {
            interval_secs: Some(15),
            proxy: Some("socks5://127.0.0.1:9150".into()),
            probe_url: Some("https://api.ipify.org?format=json".into()),
            address_field: Some("ip".into()),
            service: Some("tor@default".into()),
            on_exhausted: Some(ExhaustedPolicy::Exit),
            restart_wait: Some(RestartWait::Await),
            shutdown_timeout_secs: Some(5),
        }
        .resolve()
        .unwrap();

        assert_eq!(config.interval(), Duration::from_secs(15));
        assert_eq!(config.proxy.port(), 9150);
        assert_eq!(config.probe.address_field, "ip");
        assert_eq!(config.service, "tor@default");
        assert_eq!(config.on_exhausted, ExhaustedPolicy::Exit);
        assert_eq!(config.restart_wait, RestartWait::Await);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
    }

    #[test]
    fn resolve_rejects_non_http_probe_url() {
        let settings = Settings {
            probe_url: Some("gopher://example.org".into()),
            ..Default::default()
        };
        assert!(matches!(settings.resolve(), Err(Error::Config(_))));
    }

    #[test]
    fn settings_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{ "interval_secs": 90, "on_exhausted": "exit", "restart_wait": "await" }"#,
        )
        .unwrap();

        let settings = load_settings(Some(&path)).unwrap();
        assert_eq!(settings.interval_secs, Some(90));
        assert_eq!(settings.on_exhausted, Some(ExhaustedPolicy::Exit));
        assert_eq!(settings.restart_wait, Some(RestartWait::Await));
        assert!(settings.proxy.is_none());
    }

    #[test]
    fn settings_file_rejects_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "intervall": 90 }"#).unwrap();

        assert!(matches!(load_settings(Some(&path)), Err(Error::Config(_))));
    }

    #[test]
    fn missing_explicit_settings_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        assert!(load_settings(Some(&path)).is_err());
    }
}
