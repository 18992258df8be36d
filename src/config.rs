//! Daemon configuration loaded from a YAML file.
//!
//! DESIGN
//! ======
//! The file describes the two upstream routers (association controller and
//! DHCP server), the HTTP listener, and the device directory with per-event
//! webhook rules. Durations use humantime syntax (`3s`, `1m30s`).
//!
//! Parsing and validation both happen before any task is spawned; a
//! `ConfigError` is the only error allowed to stop the process.
//!
//! A couple of queue/timeout tunables that operators rarely touch come from
//! environment variables instead, with defaults.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::model::normalize_mac;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
pub const DEFAULT_WEB_ROOT: &str = "html";
pub const DEFAULT_LOG_LEVEL: &str = "info";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_LEASE_INTERVAL: Duration = Duration::from_secs(60);
pub const MIN_LEASE_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 1024;
const DEFAULT_NOTIFY_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// =============================================================================
// TYPES
// =============================================================================

/// Which registration table the controller exposes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum RouterMode {
    /// CAPsMAN controller (`rx-signal`).
    #[default]
    CapsMan,
    /// Standalone wireless interface (`signal-strength`).
    Wifi,
}

impl FromStr for RouterMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "capsman" => Ok(Self::CapsMan),
            "wifi" => Ok(Self::Wifi),
            other => Err(ConfigError::Invalid(format!("unknown router mode '{other}' (expected 'capsman' or 'wifi')"))),
        }
    }
}

impl TryFrom<String> for RouterMode {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Connection settings for one RouterOS API endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    pub address: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Poll/refresh period; the default depends on the role.
    #[serde(default, deserialize_with = "deserialize_opt_duration")]
    pub interval: Option<Duration>,
    #[serde(default = "default_upstream_timeout", deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
    #[serde(default)]
    pub mode: RouterMode,
}

/// Outbound HTTP call fired for one device/event pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NotifyRule {
    #[serde(rename = "http.get", default)]
    pub http_get: String,
    #[serde(rename = "http.post", default)]
    pub http_post: String,
    #[serde(rename = "http.post.content", default)]
    pub http_post_content: String,
    #[serde(rename = "http.header", default)]
    pub http_header: BTreeMap<String, String>,
}

impl NotifyRule {
    /// A rule fires only when it names a URL.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.http_get.is_empty() || !self.http_post.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub name: String,
    pub mac: String,
    #[serde(rename = "on.connect", default)]
    pub on_connect: NotifyRule,
    #[serde(rename = "on.disconnect", default)]
    pub on_disconnect: NotifyRule,
    #[serde(rename = "on.roaming", default)]
    pub on_roaming: NotifyRule,
    #[serde(rename = "on.level", default)]
    pub on_level: NotifyRule,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_web_root")]
    pub root: PathBuf,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { listen: default_listen(), root: default_web_root() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub http: HttpConfig,
    pub router: RouterConfig,
    pub dhcp: RouterConfig,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

// =============================================================================
// LOADING
// =============================================================================

impl Config {
    /// Read, parse and validate a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file is unreadable, malformed, or
    /// out of range.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source =
            std::fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::from_yaml(&source)
    }

    /// Parse and validate YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the text is malformed or out of range.
    pub fn from_yaml(source: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.router.interval.unwrap_or(DEFAULT_POLL_INTERVAL)
    }

    #[must_use]
    pub fn lease_interval(&self) -> Duration {
        self.dhcp.interval.unwrap_or(DEFAULT_LEASE_INTERVAL)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.router.address.trim().is_empty() {
            return Err(ConfigError::Invalid("router.address is required".into()));
        }
        if self.dhcp.address.trim().is_empty() {
            return Err(ConfigError::Invalid("dhcp.address is required".into()));
        }
        if self.poll_interval() < MIN_POLL_INTERVAL {
            return Err(ConfigError::Invalid(format!(
                "router.interval must be at least {}",
                humantime::format_duration(MIN_POLL_INTERVAL)
            )));
        }
        if self.lease_interval() < MIN_LEASE_INTERVAL {
            return Err(ConfigError::Invalid(format!(
                "dhcp.interval must be at least {}",
                humantime::format_duration(MIN_LEASE_INTERVAL)
            )));
        }
        if self.router.timeout.is_zero() || self.dhcp.timeout.is_zero() {
            return Err(ConfigError::Invalid("upstream timeout must be non-zero".into()));
        }

        let mut seen = HashSet::new();
        for device in &self.devices {
            let mac = normalize_mac(&device.mac);
            if mac.is_empty() {
                return Err(ConfigError::Invalid(format!("device '{}' has no mac", device.name)));
            }
            if !seen.insert(mac.clone()) {
                return Err(ConfigError::Invalid(format!("duplicate device mac {mac}")));
            }
        }
        Ok(())
    }
}

/// Runtime knobs read from the environment.
#[derive(Debug, Clone, Copy)]
pub struct Tunables {
    /// Bounded capacity of the reconciler → dispatcher event queue.
    pub event_queue_capacity: usize,
    /// Request timeout for outbound webhook calls.
    pub notify_timeout: Duration,
}

impl Tunables {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            event_queue_capacity: env_parse("EVENT_QUEUE_CAPACITY", DEFAULT_EVENT_QUEUE_CAPACITY).max(1),
            notify_timeout: Duration::from_secs(env_parse("NOTIFY_TIMEOUT_SECS", DEFAULT_NOTIFY_TIMEOUT_SECS)),
        }
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

// =============================================================================
// SERDE HELPERS
// =============================================================================

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.into()
}

fn default_listen() -> String {
    DEFAULT_LISTEN.into()
}

fn default_web_root() -> PathBuf {
    PathBuf::from(DEFAULT_WEB_ROOT)
}

fn default_upstream_timeout() -> Duration {
    DEFAULT_UPSTREAM_TIMEOUT
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
}

fn deserialize_opt_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|s| humantime::parse_duration(s.trim()).map_err(serde::de::Error::custom))
        .transpose()
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
