//! MQTT broker configuration.

use std::fmt;

use serde::Deserialize;

/// Configuration for the broker connection.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// MQTT broker hostname or IP address.
    pub broker_host: String,
    /// MQTT broker port.
    pub broker_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// MQTT client identifier.
    pub client_id: String,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u16,
    /// Topic prefix the hub listens on for discovery configs.
    pub discovery_prefix: String,
    /// Capacity of the outgoing request queue.
    pub channel_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            username: None,
            password: None,
            client_id: "chirpbridge".to_string(),
            keep_alive_secs: 30,
            discovery_prefix: "homeassistant".to_string(),
            channel_capacity: 100,
        }
    }
}

impl fmt::Debug for MqttConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttConfig")
            .field("broker_host", &self.broker_host)
            .field("broker_port", &self.broker_port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("client_id", &self.client_id)
            .field("keep_alive_secs", &self.keep_alive_secs)
            .field("discovery_prefix", &self.discovery_prefix)
            .field("channel_capacity", &self.channel_capacity)
            .finish()
    }
}
