//! Configuration Module
//!
//! Provides TOML-based configuration for HitBridge with support for:
//! - Logging level
//! - Hardware broker connection
//! - WebSocket fanout server
//! - Guard timings (duplicate window, reset token lifetime)
//! - Metrics / operator endpoint
//! - Environment variable overrides (HITBRIDGE__* prefix)

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use config::{Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;

pub use metrics::MetricsConfig;
pub use mqtt::MqttConfig;

mod metrics;
mod mqtt;

/// Substitute environment variables in a string.
/// Supports `${VAR}` and `${VAR:-default}` syntax.
fn substitute_env_vars(content: &str) -> String {
    let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").unwrap();
    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var_name).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}

#[cfg(test)]
mod tests;

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Config crate error
    Config(config::ConfigError),
    /// Validation error
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Config(e) => write!(f, "Config error: {}", e),
            ConfigError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Config(e)
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,
    /// Hardware broker connection
    pub mqtt: MqttConfig,
    /// WebSocket fanout server
    pub websocket: WebSocketConfig,
    /// Duplicate and self-echo guards
    pub guard: GuardConfig,
    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// WebSocket server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Bind address
    pub bind: SocketAddr,
    /// Request path clients connect to
    pub path: String,
    /// Events buffered per client before it starts skipping
    pub broadcast_capacity: usize,
    /// Maximum concurrent client connections (0 = unlimited)
    pub max_connections: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
            path: "/ws/game/".to_string(),
            broadcast_capacity: 1024,
            max_connections: 1000,
        }
    }
}

/// Guard timings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Identical messages on a topic within this window are dropped (e.g., "1s")
    #[serde(with = "humantime_serde")]
    pub dedup_window: Duration,
    /// How long a self-published reset waits for its echo (e.g., "5s")
    #[serde(with = "humantime_serde")]
    pub reset_token_ttl: Duration,
    /// How often expired reset tokens are swept
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_secs(1),
            reset_token_ttl: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(1),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file with environment variable overrides.
    ///
    /// Supports two forms of environment variable usage:
    /// 1. In-file substitution: `${VAR}` or `${VAR:-default}` syntax in the TOML file
    /// 2. Override via env vars: `HITBRIDGE__` prefix with double underscores for nesting:
    ///    - `HITBRIDGE__MQTT__HOST=broker.local` overrides `mqtt.host`
    ///    - `HITBRIDGE__WEBSOCKET__BIND=0.0.0.0:8080` overrides `websocket.bind`
    ///    - `HITBRIDGE__MQTT__ENABLED=false` overrides `mqtt.enabled`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("log.level", "info")?
            .set_default("mqtt.enabled", true)?
            .set_default("mqtt.host", "localhost")?
            .set_default("mqtt.port", 1883)?
            .set_default("mqtt.keepalive", 60)?
            .set_default("mqtt.reconnect_interval", 1)?
            .set_default("mqtt.max_reconnect_interval", 30)?
            .set_default("mqtt.qos", 0)?
            .set_default("mqtt.channel_capacity", 1024)?
            .set_default("websocket.bind", "0.0.0.0:8000")?
            .set_default("websocket.path", "/ws/game/")?
            .set_default("websocket.broadcast_capacity", 1024)?
            .set_default("websocket.max_connections", 1000)?
            .set_default("guard.dedup_window", "1s")?
            .set_default("guard.reset_token_ttl", "5s")?
            .set_default("guard.sweep_interval", "1s")?
            .set_default("metrics.enabled", false)?
            .set_default("metrics.bind", "0.0.0.0:9090")?;

        // Load from file with env var substitution
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let substituted = substitute_env_vars(&content);
                builder = builder.add_source(File::from_str(&substituted, FileFormat::Toml));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File doesn't exist, use defaults
            }
            Err(e) => return Err(ConfigError::Io(e)),
        }

        // Double underscore separates nested keys, single underscore preserved in field names
        let cfg = builder
            .add_source(
                Environment::with_prefix("HITBRIDGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = cfg.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides only (no file).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Path::new(""))
    }

    /// Parse configuration from a string (for testing, no env var support)
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.qos > 1 {
            return Err(ConfigError::Validation("mqtt.qos must be 0 or 1".to_string()));
        }

        if self.mqtt.enabled && self.mqtt.host.trim().is_empty() {
            return Err(ConfigError::Validation(
                "mqtt.host is required when mqtt is enabled".to_string(),
            ));
        }

        if self.mqtt.channel_capacity == 0 {
            return Err(ConfigError::Validation(
                "mqtt.channel_capacity must be greater than 0".to_string(),
            ));
        }

        if !self.websocket.path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "websocket.path must start with '/', got '{}'",
                self.websocket.path
            )));
        }

        if self.websocket.broadcast_capacity == 0 {
            return Err(ConfigError::Validation(
                "websocket.broadcast_capacity must be greater than 0".to_string(),
            ));
        }

        for (name, value) in [
            ("guard.dedup_window", self.guard.dedup_window),
            ("guard.reset_token_ttl", self.guard.reset_token_ttl),
            ("guard.sweep_interval", self.guard.sweep_interval),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Validation(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        Ok(())
    }
}
