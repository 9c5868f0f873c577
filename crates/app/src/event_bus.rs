//! In-process event bus backed by a tokio broadcast channel.

use std::future::Future;

use tokio::sync::broadcast;

use gattbridge_domain::error::GattBridgeError;

use crate::ports::EventPublisher;
use crate::session::SessionEvent;

/// In-process event bus using a tokio [`broadcast`] channel.
///
/// Publishing succeeds even when there are no active subscribers
/// (the event is simply dropped). Slow subscribers lose the oldest events
/// once `capacity` is exceeded.
pub struct InProcessEventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl InProcessEventBus {
    /// Create a new event bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events on this bus.
    ///
    /// Returns a receiver that will get all events published *after*
    /// the subscription is created.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }
}

impl EventPublisher for InProcessEventBus {
    fn publish(
        &self,
        event: SessionEvent,
    ) -> impl Future<Output = Result<(), GattBridgeError>> + Send {
        // send only fails when nobody is listening
        let _ = self.sender.send(event);
        async { Ok(()) }
    }
}
