//! MQTT adapter error types.

use gattbridge_domain::error::GattBridgeError;

/// Errors specific to the MQTT adapter.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    /// The rumqttc client refused the request.
    #[error("MQTT client error")]
    Client(#[source] rumqttc::ClientError),

    /// The connection to the broker failed.
    #[error("MQTT connection error")]
    Connection(#[source] rumqttc::ConnectionError),
}

impl MqttError {
    /// Convert into a [`GattBridgeError::Broker`] for propagation across port
    /// boundaries.
    #[must_use]
    pub fn into_domain(self) -> GattBridgeError {
        GattBridgeError::Broker(Box::new(self))
    }
}

impl From<MqttError> for GattBridgeError {
    fn from(err: MqttError) -> Self {
        err.into_domain()
    }
}
