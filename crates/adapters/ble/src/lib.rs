//! # gattbridge-adapter-ble
//!
//! GATT client adapter: implements the [`Transport`] port on top of
//! `btleplug` for one peripheral at a time.
//!
//! ## How it works
//!
//! The peripheral is looked up by address among the peripherals the host
//! already knows, falling back to a short scan. Once connected, two
//! background tasks forward value notifications and link loss onto the
//! [`TransportEvent`] channel handed to [`BleTransport::new`].
//!
//! ## Dependency rule
//!
//! Same as other adapters: depends on `gattbridge-app` and `gattbridge-domain`.
//!
//! [`Transport`]: gattbridge_app::ports::Transport
//! [`TransportEvent`]: gattbridge_app::ports::TransportEvent

mod config;
mod error;
mod gatt;
mod transport;

pub use config::BleConfig;
pub use error::BleError;
pub use transport::BleTransport;
