//! MQTT adapter configuration.

use std::time::Duration;

use rumqttc::MqttOptions;
use serde::Deserialize;

/// Configuration for the broker connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// MQTT broker hostname or IP address.
    pub broker_host: String,
    /// MQTT broker port.
    pub broker_port: u16,
    /// MQTT client identifier.
    pub client_id: String,
    /// Prefix for every published topic. Empty means no prefix.
    pub base_topic: String,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u16,
    /// Ask the broker to discard session state on connect.
    pub clean_session: bool,
    /// Keep reconnecting after the connection drops.
    pub auto_reconnect: bool,
    /// First reconnect delay, in milliseconds. Doubles on each failure.
    pub reconnect_initial_ms: u64,
    /// Upper bound on the reconnect delay, in milliseconds.
    pub reconnect_max_ms: u64,
    /// Messages held while the broker is unreachable; the oldest are
    /// dropped beyond this.
    pub buffer_capacity: usize,
    /// Capacity of the client's outgoing request queue.
    pub request_channel_capacity: usize,
}

impl MqttConfig {
    /// Connection options for rumqttc.
    #[must_use]
    pub fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.broker_host, self.broker_port);
        options.set_keep_alive(Duration::from_secs(u64::from(self.keep_alive_secs)));
        options.set_clean_session(self.clean_session);
        options
    }

    #[must_use]
    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_ms)
    }

    #[must_use]
    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "gattbridge".to_string(),
            base_topic: String::new(),
            keep_alive_secs: 30,
            clean_session: false,
            auto_reconnect: true,
            reconnect_initial_ms: 500,
            reconnect_max_ms: 30_000,
            buffer_capacity: 5000,
            request_channel_capacity: 64,
        }
    }
}
