use crate::error::{Error, Result};
use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Room layer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    pub relay: RelayConfig,
    pub events: EventConfig,
    pub logging: LoggingConfig,
}

/// Relay agent and forwarding settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// How many times a relaying publication is looked up before giving up
    pub resolve_attempts: u32,
    pub resolve_interval_ms: u64,
    pub default_max_subscribers: u32,
    pub max_subscribers_limit: u32,
    /// Bot subtype that identifies the relay agent
    pub bot_subtype: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            resolve_attempts: 10,
            resolve_interval_ms: 100,
            default_max_subscribers: 10,
            max_subscribers_limit: 99,
            bot_subtype: "sfu".to_string(),
        }
    }
}

impl RelayConfig {
    #[must_use]
    pub const fn resolve_interval(&self) -> Duration {
        Duration::from_millis(self.resolve_interval_ms)
    }

    /// Subscriber limit for a forwarding, clamped to the configured maximum
    #[must_use]
    pub fn max_subscribers(&self, requested: Option<u32>) -> u32 {
        let requested = requested.unwrap_or(self.default_max_subscribers);
        if requested > self.max_subscribers_limit {
            warn!(
                requested,
                limit = self.max_subscribers_limit,
                "Max subscribers above limit, clamping"
            );
            return self.max_subscribers_limit;
        }
        requested
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Buffer size of each room's event broadcast
    pub capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl RoomConfig {
    /// Load configuration from file and environment variables
    ///
    /// Priority (highest first):
    /// 1. Environment variables (`ROOMLINK_RELAY__RESOLVE_ATTEMPTS`, ...)
    /// 2. Config file (if provided and present)
    /// 3. Defaults
    pub fn load(config_file: Option<&str>) -> std::result::Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("ROOMLINK")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        Self::load(None)
    }

    pub fn from_file(path: &str) -> std::result::Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Reject settings the room layer cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.relay.resolve_attempts == 0 {
            return Err(Error::InvalidInput(
                "relay.resolve_attempts must be greater than zero".to_string(),
            ));
        }
        if self.relay.resolve_interval_ms == 0 {
            return Err(Error::InvalidInput(
                "relay.resolve_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.relay.default_max_subscribers > self.relay.max_subscribers_limit {
            return Err(Error::InvalidInput(format!(
                "relay.default_max_subscribers ({}) exceeds relay.max_subscribers_limit ({})",
                self.relay.default_max_subscribers, self.relay.max_subscribers_limit
            )));
        }
        if self.relay.bot_subtype.is_empty() {
            return Err(Error::InvalidInput(
                "relay.bot_subtype must not be empty".to_string(),
            ));
        }
        if self.events.capacity == 0 {
            return Err(Error::InvalidInput(
                "events.capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
