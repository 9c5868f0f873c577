//! # gattbridge-adapter-mqtt
//!
//! MQTT adapter: implements the [`BrokerClient`] port with `rumqttc`.
//!
//! ## Responsibilities
//! - Open the broker connection and keep it alive
//! - Reconnect with exponential backoff after the link drops
//! - Report connected / lost / message-arrived as [`BrokerEvent`]s
//! - Hand outgoing messages to the client without blocking the caller
//!
//! ## Dependency rule
//! Same as other adapters: depends on `gattbridge-app` and `gattbridge-domain`.
//!
//! [`BrokerClient`]: gattbridge_app::ports::BrokerClient
//! [`BrokerEvent`]: gattbridge_app::ports::BrokerEvent

mod backoff;
mod client;
mod config;
mod error;

pub use client::{MqttBroker, MqttPublisher};
pub use config::MqttConfig;
pub use error::MqttError;
