//! Event bus port: publish/subscribe for session events.

use std::future::Future;

use gattbridge_domain::error::GattBridgeError;

use crate::session::SessionEvent;

/// Publishes session events to interested subscribers.
pub trait EventPublisher {
    /// Publish an event to all current subscribers.
    fn publish(
        &self,
        event: SessionEvent,
    ) -> impl Future<Output = Result<(), GattBridgeError>> + Send;
}

impl<T: EventPublisher + Send + Sync> EventPublisher for std::sync::Arc<T> {
    fn publish(
        &self,
        event: SessionEvent,
    ) -> impl Future<Output = Result<(), GattBridgeError>> + Send {
        (**self).publish(event)
    }
}
