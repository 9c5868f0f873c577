//! BLE adapter error types.

use btleplug::api::ParseBDAddrError;
use gattbridge_domain::error::GattBridgeError;

/// Errors specific to the BLE adapter.
#[derive(Debug, thiserror::Error)]
pub enum BleError {
    /// No BLE adapter found on the host.
    #[error("no BLE adapter available")]
    NotAvailable,

    /// A `btleplug` operation failed.
    #[error("BLE operation failed")]
    Btle(#[from] btleplug::Error),

    /// The peripheral address is not a MAC address.
    #[error("invalid peripheral address")]
    InvalidAddress(#[source] ParseBDAddrError),

    /// The peripheral did not show up during the scan.
    #[error("peripheral {address} not found")]
    PeripheralNotFound {
        /// Address that was looked for.
        address: String,
    },

    /// The operation needs a connected peripheral.
    #[error("no peripheral connected")]
    NotConnected,

    /// The connected peripheral does not expose this characteristic.
    #[error("characteristic {uuid} not found")]
    CharacteristicNotFound {
        /// UUID that was looked for.
        uuid: uuid::Uuid,
    },

    /// The connection attempt did not complete in time.
    #[error("connection timed out")]
    Timeout,
}

impl BleError {
    /// Convert into a [`GattBridgeError`] for propagation across port
    /// boundaries.
    #[must_use]
    pub fn into_domain(self) -> GattBridgeError {
        match self {
            Self::NotAvailable => GattBridgeError::TransportUnavailable,
            other => GattBridgeError::Transport(Box::new(other)),
        }
    }
}

impl From<BleError> for GattBridgeError {
    fn from(err: BleError) -> Self {
        err.into_domain()
    }
}
