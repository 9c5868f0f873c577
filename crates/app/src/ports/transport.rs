//! Transport port: the serialized GATT link to one peripheral.
//!
//! Adapters implement [`Transport`] for a concrete radio stack. Every
//! operation is awaited by the session task, one at a time; link loss and
//! value pushes arrive separately as [`TransportEvent`]s on the channel the
//! adapter was built with.
//!
//! Each successful [`Transport::connect`] opens a new link with its own
//! [`LinkId`]. Link-loss events carry that id so a loss reported for an
//! earlier link can be told apart from the current one.

use std::future::Future;

use gattbridge_domain::error::GattBridgeError;
use gattbridge_domain::gatt::{Characteristic, Service};
use uuid::Uuid;

/// Identifies one connection, unique for the lifetime of a transport.
pub type LinkId = u64;

/// Asynchronous callback from the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The peripheral dropped `link` without being asked to.
    Disconnected { link: LinkId },
    /// A subscribed characteristic pushed a new value.
    Notification { uuid: Uuid, value: Vec<u8> },
}

/// GATT client operations against a single peripheral.
pub trait Transport: Send + Sync {
    /// Whether a local radio is present and initialised.
    fn is_available(&self) -> bool;

    /// Connect to `address`, resolving once the link is up.
    fn connect(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<LinkId, GattBridgeError>> + Send;

    /// Enumerate services and their characteristics.
    fn discover_services(&self)
    -> impl Future<Output = Result<Vec<Service>, GattBridgeError>> + Send;

    /// Read the current value of a characteristic.
    fn read(
        &self,
        characteristic: &Characteristic,
    ) -> impl Future<Output = Result<Vec<u8>, GattBridgeError>> + Send;

    /// Write a value to a characteristic.
    fn write(
        &self,
        characteristic: &Characteristic,
        value: &[u8],
    ) -> impl Future<Output = Result<(), GattBridgeError>> + Send;

    /// Enable or disable value-change notifications.
    fn set_notification(
        &self,
        characteristic: &Characteristic,
        enabled: bool,
    ) -> impl Future<Output = Result<(), GattBridgeError>> + Send;

    /// Drop the link, resolving once it is down. An explicit disconnect is
    /// not reported as a [`TransportEvent::Disconnected`].
    fn disconnect(&self) -> impl Future<Output = Result<(), GattBridgeError>> + Send;

    /// Release the underlying handle. Must be idempotent.
    fn close(&self) -> impl Future<Output = Result<(), GattBridgeError>> + Send;
}
