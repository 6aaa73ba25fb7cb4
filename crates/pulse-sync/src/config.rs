//! Sync client configuration with validation.
//!
//! Loaded from TOML, overridable from the environment. Durations are
//! expressed in milliseconds (`*_ms` keys).
//!
//! ```toml
//! [api]
//! base_url = "http://localhost:8000"
//! request_timeout_ms = 10000
//!
//! [connection]
//! ws_url = "ws://localhost:8000/ws"
//! heartbeat_interval_ms = 30000
//! connect_timeout_ms = 10000
//!
//! [reconnect]
//! base_delay_ms = 1000
//! max_delay_ms = 30000
//! max_attempts = 5
//!
//! [cache]
//! fetch_timeout_ms = 10000
//! max_entries = 64
//!
//! [cache.ttl]
//! status_ms = 30000
//!
//! [events]
//! log_capacity = 100
//! ```

use pulse_types::ResourceKind;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use std::fs;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::domain::{ReconnectPolicy, DEFAULT_LOG_CAPACITY};
use crate::error::ConfigError;

/// Main sync client configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// REST endpoint configuration
    pub api: ApiConfig,
    /// Push connection configuration
    pub connection: ConnectionConfig,
    /// Automatic reconnect backoff
    pub reconnect: ReconnectConfig,
    /// Pull cache configuration
    pub cache: CacheConfig,
    /// Event log configuration
    pub events: EventsConfig,
}

/// REST endpoint configuration
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "request_timeout_ms")]
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Push connection configuration
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub ws_url: String,
    /// Probe interval; a connection silent for longer is force-closed
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "heartbeat_interval_ms")]
    pub heartbeat_interval: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "connect_timeout_ms")]
    pub connect_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:8000/ws".to_string(),
            heartbeat_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Automatic reconnect backoff
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "base_delay_ms")]
    pub base_delay: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "max_delay_ms")]
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        let policy = ReconnectPolicy::default();
        Self {
            base_delay: policy.base_delay,
            max_delay: policy.max_delay,
            max_attempts: policy.max_attempts,
        }
    }
}

impl ReconnectConfig {
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            max_attempts: self.max_attempts,
        }
    }
}

/// Pull cache configuration
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "fetch_timeout_ms")]
    pub fetch_timeout: Duration,
    /// Least recently used entries are evicted past this bound
    pub max_entries: Option<usize>,
    pub ttl: TtlConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
            max_entries: None,
            ttl: TtlConfig::default(),
        }
    }
}

/// Per-resource cache TTLs
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlConfig {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "restaurants_ms")]
    pub restaurants: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "restaurant_detail_ms")]
    pub restaurant_detail: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "analytics_ms")]
    pub analytics: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "trends_ms")]
    pub trends: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "status_ms")]
    pub status: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "health_ms")]
    pub health: Duration,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            restaurants: Duration::from_secs(5 * 60),
            restaurant_detail: Duration::from_secs(5 * 60),
            analytics: Duration::from_secs(10 * 60),
            trends: Duration::from_secs(10 * 60),
            status: Duration::from_secs(30),
            health: Duration::from_secs(30),
        }
    }
}

impl TtlConfig {
    /// TTL for a resource kind.
    pub fn for_kind(&self, kind: ResourceKind) -> Duration {
        match kind {
            ResourceKind::RestaurantList => self.restaurants,
            ResourceKind::RestaurantDetail => self.restaurant_detail,
            ResourceKind::Analytics => self.analytics,
            ResourceKind::Trends => self.trends,
            ResourceKind::Status => self.status,
            ResourceKind::Health => self.health,
        }
    }
}

/// Event log configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub log_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

impl SyncConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// File (if any), then environment overrides, then validation.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `PULSE_API_URL`: REST base URL
    /// - `PULSE_WS_URL`: push channel URL
    /// - `PULSE_HEARTBEAT_MS`: heartbeat interval
    /// - `PULSE_MAX_RECONNECT_ATTEMPTS`: automatic retry bound
    /// - `PULSE_EVENT_LOG_CAPACITY`: event log size
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("PULSE_API_URL") {
            self.api.base_url = url;
        }
        if let Some(url) = lookup("PULSE_WS_URL") {
            self.connection.ws_url = url;
        }
        if let Some(ms) = lookup("PULSE_HEARTBEAT_MS") {
            self.connection.heartbeat_interval =
                Duration::from_millis(parse_number("PULSE_HEARTBEAT_MS", &ms)?);
        }
        if let Some(attempts) = lookup("PULSE_MAX_RECONNECT_ATTEMPTS") {
            self.reconnect.max_attempts = parse_number("PULSE_MAX_RECONNECT_ATTEMPTS", &attempts)?;
        }
        if let Some(capacity) = lookup("PULSE_EVENT_LOG_CAPACITY") {
            self.events.log_capacity = parse_number("PULSE_EVENT_LOG_CAPACITY", &capacity)?;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("api.base_url", &self.api.base_url, &["http", "https"])?;
        check_url("connection.ws_url", &self.connection.ws_url, &["ws", "wss"])?;

        if self.connection.heartbeat_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "heartbeat_interval_ms cannot be 0".into(),
            ));
        }

        if self.connection.connect_timeout.is_zero() {
            return Err(ConfigError::Invalid("connect_timeout_ms cannot be 0".into()));
        }

        if self.reconnect.base_delay > self.reconnect.max_delay {
            return Err(ConfigError::Invalid(
                "base_delay_ms cannot exceed max_delay_ms".into(),
            ));
        }

        if self.cache.fetch_timeout.is_zero() {
            return Err(ConfigError::Invalid("fetch_timeout_ms cannot be 0".into()));
        }

        if self.cache.max_entries == Some(0) {
            return Err(ConfigError::Invalid("max_entries cannot be 0".into()));
        }

        if self.events.log_capacity == 0 {
            return Err(ConfigError::Invalid("log_capacity cannot be 0".into()));
        }

        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{name} is not a number: {value:?}")))
}

fn check_url(field: &str, value: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::Invalid(format!("{field}: {e}")))?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::Invalid(format!(
            "{field} must use one of {schemes:?}, got {}",
            url.scheme()
        )));
    }
    Ok(())
}
