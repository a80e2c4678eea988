//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `chirpbridge.toml` in the working directory (or the file named
//! by `CHIRPBRIDGE_CONFIG`). Every field has a default so the file is
//! optional. Environment variables take precedence over file values.

use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use chirpbridge_adapter_chirpstack::ChirpstackConfig;
use chirpbridge_adapter_mqtt::MqttConfig;
use chirpbridge_app::bridge::BridgeSettings;

const DEFAULT_PATH: &str = "chirpbridge.toml";
const MIN_API_KEY_LEN: usize = 10;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub chirpstack: ChirpstackConfig,
    pub mqtt: MqttConfig,
    pub bridge: BridgeConfig,
    pub logging: LoggingConfig,
}

/// Bridge behaviour.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Seconds to wait after the bridge status echo before replaying
    /// retained snapshots.
    pub start_delay_secs: u64,
    /// Seconds after which the replay window closes.
    pub restore_age_secs: u64,
    /// Log full discovery and cache payloads.
    pub debug_payload: bool,
    /// Bridge unique id; derived from the connection settings when unset.
    pub unique_id: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Config {
    /// Load configuration from the config file (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("CHIRPBRIDGE_CONFIG").unwrap_or_else(|_| DEFAULT_PATH.to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("CHIRPBRIDGE_SERVER") {
            self.chirpstack.server = val;
        }
        if let Some(val) = var("CHIRPBRIDGE_API_KEY") {
            self.chirpstack.api_key = val;
        }
        if let Some(val) = var("CHIRPBRIDGE_TENANT") {
            self.chirpstack.tenant = val;
        }
        if let Some(val) = var("CHIRPBRIDGE_APPLICATION") {
            self.chirpstack.application = val;
        }
        if let Some(val) = var("CHIRPBRIDGE_APPLICATION_ID") {
            self.chirpstack.application_id = Some(val);
        }
        if let Some(val) = var("CHIRPBRIDGE_MQTT_HOST") {
            self.mqtt.broker_host = val;
        }
        if let Some(port) = var("CHIRPBRIDGE_MQTT_PORT").and_then(|val| val.parse().ok()) {
            self.mqtt.broker_port = port;
        }
        if let Some(val) = var("CHIRPBRIDGE_MQTT_USERNAME") {
            self.mqtt.username = Some(val);
        }
        if let Some(val) = var("CHIRPBRIDGE_MQTT_PASSWORD") {
            self.mqtt.password = Some(val);
        }
        if let Some(val) = var("CHIRPBRIDGE_DISCOVERY_PREFIX") {
            self.mqtt.discovery_prefix = val;
        }
        if let Some(val) = var("CHIRPBRIDGE_UNIQUE_ID") {
            self.bridge.unique_id = Some(val);
        }
        if let Some(val) = var("CHIRPBRIDGE_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.broker_port == 0 {
            return Err(ConfigError::Validation("mqtt port must be non-zero".to_string()));
        }
        if self.mqtt.discovery_prefix.trim().is_empty() {
            return Err(ConfigError::Validation(
                "discovery prefix must not be empty".to_string(),
            ));
        }
        if self.chirpstack.api_key.len() < MIN_API_KEY_LEN {
            return Err(ConfigError::Validation(format!(
                "api key must be at least {MIN_API_KEY_LEN} characters"
            )));
        }
        Ok(())
    }

    /// Bridge unique id: the configured one, or a UUIDv5 of the connection
    /// settings so that it stays stable across restarts.
    #[must_use]
    pub fn unique_id(&self) -> String {
        if let Some(id) = self.bridge.unique_id.as_deref().filter(|id| !id.is_empty()) {
            return id.to_string();
        }
        let port = self.mqtt.broker_port.to_string();
        let seed = [
            self.chirpstack.server.as_str(),
            self.chirpstack.tenant.as_str(),
            self.chirpstack.application.as_str(),
            self.chirpstack.application_id.as_deref().unwrap_or_default(),
            self.mqtt.broker_host.as_str(),
            port.as_str(),
            self.mqtt.discovery_prefix.as_str(),
        ]
        .join("|");
        Uuid::new_v5(&Uuid::NAMESPACE_URL, seed.as_bytes())
            .simple()
            .to_string()
    }

    #[must_use]
    pub fn bridge_settings(&self) -> BridgeSettings {
        BridgeSettings {
            start_delay: Duration::from_secs(self.bridge.start_delay_secs),
            restore_age: Duration::from_secs(self.bridge.restore_age_secs),
            debug_payload: self.bridge.debug_payload,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            start_delay_secs: 2,
            restore_age_secs: 4,
            debug_payload: false,
            unique_id: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "chirpbridged=info,chirpbridge_app=info,chirpbridge_adapter_chirpstack=info,chirpbridge_adapter_mqtt=info"
                .to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
