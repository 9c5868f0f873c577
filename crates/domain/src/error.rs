//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into
//! [`GattBridgeError`] at port boundaries.

use uuid::Uuid;

use crate::registry::{Role, Sensor};

/// Boxed source error carried across port boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error for session and bridge operations.
#[derive(Debug, thiserror::Error)]
pub enum GattBridgeError {
    /// No local radio/adapter is available, or it was never initialised.
    #[error("BLE transport unavailable")]
    TransportUnavailable,

    /// `connect` was called without a peripheral address.
    #[error("peripheral address must not be empty")]
    InvalidAddress,

    /// The operation needs discovered services.
    #[error("session not ready")]
    NotReady,

    /// The characteristic was not found on the connected peripheral.
    #[error("unknown characteristic {0}")]
    UnknownCharacteristic(Uuid),

    /// The sensor has no sampling-period characteristic.
    #[error("{0} has no sampling period")]
    NoSamplingPeriod(Sensor),

    /// The session task has stopped.
    #[error("session closed")]
    SessionClosed,

    /// The transport adapter reported an error.
    #[error("transport error")]
    Transport(#[source] BoxError),

    /// The broker adapter reported an error.
    #[error("broker error")]
    Broker(#[source] BoxError),

    /// A payload could not be decoded.
    #[error("decode error")]
    Decode(#[from] DecodeError),
}

/// Why a characteristic payload could not be decoded for its role.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Fewer bytes than the role's fixed layout requires.
    #[error("{role} payload needs at least {expected} bytes, got {actual}")]
    TooShort {
        /// Role the payload was decoded as.
        role: Role,
        /// Minimum byte count.
        expected: usize,
        /// Actual byte count.
        actual: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_transport_unavailable() {
        assert_eq!(
            GattBridgeError::TransportUnavailable.to_string(),
            "BLE transport unavailable"
        );
    }

    #[test]
    fn should_display_too_short_decode_error() {
        let err = DecodeError::TooShort {
            role: Role::VectorMeasurement,
            expected: 6,
            actual: 4,
        };
        assert_eq!(err.to_string(), "vector payload needs at least 6 bytes, got 4");
    }

    #[test]
    fn should_name_sensor_without_sampling_period() {
        assert_eq!(
            GattBridgeError::NoSamplingPeriod(Sensor::Button).to_string(),
            "button has no sampling period"
        );
    }

    #[test]
    fn should_wrap_decode_error() {
        let err: GattBridgeError = DecodeError::TooShort {
            role: Role::Period,
            expected: 2,
            actual: 1,
        }
        .into();
        assert!(matches!(err, GattBridgeError::Decode(_)));
    }

    #[test]
    fn should_keep_transport_source() {
        let io = std::io::Error::other("radio off");
        let err = GattBridgeError::Transport(Box::new(io));
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "radio off");
    }
}
