//! # gattbridge-domain
//!
//! Pure domain model for the GATT-to-broker bridge.
//!
//! ## Responsibilities
//! - The **attribute registry**: known services, characteristics, and their roles
//! - The **codec**: raw characteristic payloads ⇄ typed values
//! - The **GATT model**: discovered services and characteristics
//! - **Samples**: decoded values tagged with channel and arrival order
//! - Error conventions shared by every layer
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or IO crates.

pub mod codec;
pub mod error;
pub mod gatt;
pub mod registry;
pub mod sample;
