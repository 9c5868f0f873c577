//! Broker port: outbound publish plus connection callbacks.

use gattbridge_domain::error::GattBridgeError;

/// Callback from the broker connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    /// The broker acknowledged a (re)connection.
    Connected { session_present: bool },
    /// The connection dropped; the adapter keeps retrying on its own.
    ConnectionLost,
    /// A message arrived on a subscribed topic.
    MessageArrived { topic: String, payload: Vec<u8> },
}

/// Sends text messages to the broker.
///
/// `publish` must not block: adapters hand the message to their own I/O
/// task and return immediately.
pub trait BrokerClient: Send + Sync {
    /// Hand one message to the broker connection.
    ///
    /// # Errors
    ///
    /// Returns [`GattBridgeError::Broker`] when the message could not be
    /// queued for sending.
    fn publish(&self, topic: &str, payload: &str) -> Result<(), GattBridgeError>;
}

impl<T: BrokerClient> BrokerClient for std::sync::Arc<T> {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), GattBridgeError> {
        (**self).publish(topic, payload)
    }
}
