//! # gattbridge-app
//!
//! Application layer: the session state machine, setup scheduling, the
//! event bridge, and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `Transport`: the serialized GATT link to one peripheral
//!   - `BrokerClient`: non-blocking publish to the message broker
//!   - `EventPublisher`: fan-out of session events
//! - Drive one peripheral from connect through discovery and configuration
//!   (`session`), gating every transport operation through a single task
//! - Turn samples into broker messages, buffering while the broker is away
//!   (`bridge`)
//! - Periodically read one characteristic on demand (`poller`)
//! - Provide **in-process infrastructure** (event bus) that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `gattbridge-domain` only (plus `tokio` for channels and timers).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod bridge;
pub mod event_bus;
pub mod poller;
pub mod ports;
pub mod session;
