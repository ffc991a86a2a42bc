//! MQTT Broker Configuration
//!
//! Connection settings for the hardware broker.

use std::time::Duration;

use serde::Deserialize;

/// Connection to the hardware broker
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Whether to connect to the broker at all
    pub enabled: bool,

    /// Broker hostname or IP
    pub host: String,

    /// Broker port
    pub port: u16,

    /// Client ID to use when connecting
    pub client_id: String,

    /// Username for authentication (used only together with `password`)
    pub username: Option<String>,

    /// Password for authentication (used only together with `username`)
    pub password: Option<String>,

    /// Keep-alive interval in seconds
    pub keepalive: u16,

    /// Reconnect interval in seconds
    pub reconnect_interval: u64,

    /// Maximum reconnect interval in seconds (for exponential backoff)
    pub max_reconnect_interval: u64,

    /// QoS for subscriptions and publishes (0 or 1)
    pub qos: u8,

    /// Capacity of the request and inbound message channels
    pub channel_capacity: usize,
}

fn default_client_id() -> String {
    format!("hitbridge-{}", std::process::id())
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "localhost".to_string(),
            port: 1883,
            client_id: default_client_id(),
            username: None,
            password: None,
            keepalive: 60,
            reconnect_interval: 1,
            max_reconnect_interval: 30,
            qos: 0,
            channel_capacity: 1024,
        }
    }
}

impl MqttConfig {
    /// Get the keep-alive interval as Duration
    pub fn keepalive_duration(&self) -> Duration {
        Duration::from_secs(self.keepalive as u64)
    }

    /// Get the reconnect interval as Duration
    pub fn reconnect_interval_duration(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval)
    }

    /// Get the max reconnect interval as Duration
    pub fn max_reconnect_interval_duration(&self) -> Duration {
        Duration::from_secs(self.max_reconnect_interval)
    }

    /// `host:port` of the broker
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Credentials, only when both username and password are set
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                Some((user.as_str(), pass.as_str()))
            }
            _ => None,
        }
    }
}
