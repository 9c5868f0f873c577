//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `gattbridge.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::time::Duration;

use gattbridge_adapter_ble::BleConfig;
use gattbridge_adapter_mqtt::MqttConfig;
use gattbridge_app::bridge::BridgeConfig;
use gattbridge_app::session::{SessionConfig, SetupTiming};
use gattbridge_domain::registry::Channel;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Peripheral to connect to.
    pub device: DeviceConfig,
    /// Session timing.
    pub session: SessionSection,
    /// GATT transport settings.
    pub ble: BleConfig,
    /// Broker settings.
    pub mqtt: MqttConfig,
    /// Optional polling of one characteristic.
    pub poller: PollerConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Peripheral selection.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Hardware address (`AA:BB:CC:DD:EE:FF`). Without one the daemon
    /// idles until stopped.
    pub address: Option<String>,
}

/// Session timing, in milliseconds.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub grace_ms: u64,
    pub read_base_ms: u64,
    pub read_step_ms: u64,
    pub subscribe_base_ms: u64,
    pub subscribe_step_ms: u64,
    /// Sampling period written to every period characteristic.
    pub period_ms: u16,
    pub discovery_retries: u32,
}

/// Fixed-period reads of one characteristic.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    pub enabled: bool,
    pub channel: Channel,
    pub period_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Config {
    /// Load configuration from `gattbridge.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("gattbridge.toml")?;
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
        if let Some(val) = var("GATTBRIDGE_DEVICE") {
            self.device.address = Some(val).filter(|address| !address.is_empty());
        }
        if let Some(val) = var("GATTBRIDGE_MQTT_HOST") {
            self.mqtt.broker_host = val;
        }
        if let Some(val) = var("GATTBRIDGE_MQTT_PORT")
            && let Ok(port) = val.parse()
        {
            self.mqtt.broker_port = port;
        }
        if let Some(val) = var("GATTBRIDGE_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.broker_port == 0 {
            return Err(ConfigError::Validation(
                "mqtt port must be non-zero".to_string(),
            ));
        }
        if self.mqtt.client_id.is_empty() {
            return Err(ConfigError::Validation(
                "mqtt client id must not be empty".to_string(),
            ));
        }
        if self.mqtt.buffer_capacity == 0 {
            return Err(ConfigError::Validation(
                "mqtt buffer capacity must be non-zero".to_string(),
            ));
        }
        if self.mqtt.reconnect_initial_ms > self.mqtt.reconnect_max_ms {
            return Err(ConfigError::Validation(
                "mqtt reconnect_initial_ms exceeds reconnect_max_ms".to_string(),
            ));
        }
        // equal offsets would let setup actions tie
        if self.session.read_step_ms == 0 || self.session.subscribe_step_ms == 0 {
            return Err(ConfigError::Validation(
                "session read_step_ms and subscribe_step_ms must be non-zero".to_string(),
            ));
        }
        if self.poller.enabled && self.poller.period_ms == 0 {
            return Err(ConfigError::Validation(
                "poller period must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Session tunables.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        let session = &self.session;
        SessionConfig {
            grace: Duration::from_millis(session.grace_ms),
            timing: SetupTiming {
                read_base: Duration::from_millis(session.read_base_ms),
                read_step: Duration::from_millis(session.read_step_ms),
                subscribe_base: Duration::from_millis(session.subscribe_base_ms),
                subscribe_step: Duration::from_millis(session.subscribe_step_ms),
            },
            period_ms: session.period_ms,
            discovery_retries: session.discovery_retries,
        }
    }

    /// Bridge settings. An empty base topic means unprefixed topics.
    #[must_use]
    pub fn bridge_config(&self) -> BridgeConfig {
        let base = self.mqtt.base_topic.trim_matches('/');
        BridgeConfig {
            buffer_capacity: self.mqtt.buffer_capacity,
            base_topic: (!base.is_empty()).then(|| base.to_string()),
        }
    }

    /// Poll period, if polling is enabled.
    #[must_use]
    pub fn poll_period(&self) -> Option<Duration> {
        self.poller
            .enabled
            .then(|| Duration::from_millis(self.poller.period_ms))
    }
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            grace_ms: 2000,
            read_base_ms: 500,
            read_step_ms: 100,
            subscribe_base_ms: 1000,
            subscribe_step_ms: 200,
            period_ms: 80,
            discovery_retries: 2,
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            channel: Channel::TemperatureData,
            period_ms: 100,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "gattbridged=info,gattbridge=info".to_string(),
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
