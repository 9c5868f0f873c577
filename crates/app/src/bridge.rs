//! Event bridge: republishes samples on the message broker.
//!
//! The bridge follows the broker's own connected/disconnected callbacks:
//! while connected it sends straight through, while disconnected it holds
//! messages in a bounded drop-oldest buffer and flushes them, oldest first,
//! on the next connection. Publishing never blocks and never fails the
//! caller; problems surface through [`EventBridge::status`] and the log.

pub mod buffer;
pub mod topics;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use crate::ports::{BrokerClient, BrokerEvent};
use crate::session::SessionEvent;

pub use buffer::{OutboundBuffer, OutboundMessage};

/// Default number of messages held while the broker is unreachable.
pub const DEFAULT_BUFFER_CAPACITY: usize = 5000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub buffer_capacity: usize,
    /// Prefix for every topic, joined with `/`.
    pub base_topic: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            base_topic: None,
        }
    }
}

/// Broker link as seen by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerStatus {
    Connected,
    Disconnected { buffered: usize },
}

/// Turns session samples into broker messages.
pub struct EventBridge<B> {
    client: B,
    base_topic: Option<String>,
    buffer: OutboundBuffer,
    connected: bool,
    next_seq: u64,
    status: watch::Sender<BrokerStatus>,
}

impl<B: BrokerClient + 'static> EventBridge<B> {
    /// A bridge that starts out disconnected.
    #[must_use]
    pub fn new(client: B, config: BridgeConfig) -> Self {
        let (status, _) = watch::channel(BrokerStatus::Disconnected { buffered: 0 });
        Self {
            client,
            base_topic: config.base_topic.filter(|base| !base.is_empty()),
            buffer: OutboundBuffer::new(config.buffer_capacity),
            connected: false,
            next_seq: 0,
            status,
        }
    }

    /// Watch the broker link.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<BrokerStatus> {
        self.status.subscribe()
    }

    /// Messages currently held back.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Send a message now, or hold it until the broker is back.
    pub fn publish(&mut self, topic: impl Into<String>, payload: impl Into<String>) {
        let message = OutboundMessage {
            seq: self.next_seq,
            topic: topic.into(),
            payload: payload.into(),
        };
        self.next_seq += 1;

        if self.connected {
            self.flush();
            if self.buffer.is_empty() {
                match self.client.publish(&message.topic, &message.payload) {
                    Ok(()) => return,
                    Err(err) => {
                        tracing::warn!(topic = %message.topic, error = %err, "publish failed, buffering");
                    }
                }
            }
        }
        self.enqueue(message);
    }

    /// Publish a session event if it is a routable sample.
    pub fn handle_event(&mut self, event: &SessionEvent) {
        let SessionEvent::Sample(sample) = event else {
            return;
        };
        match topics::render(sample, self.base_topic.as_deref()) {
            Some((topic, payload)) => self.publish(topic, payload),
            None => tracing::trace!(uuid = %sample.uuid, "sample has no topic"),
        }
    }

    /// React to the broker connection.
    pub fn handle_broker_event(&mut self, event: BrokerEvent) {
        match event {
            BrokerEvent::Connected { session_present } => {
                tracing::info!(session_present, buffered = self.buffer.len(), "broker connected");
                self.connected = true;
                self.status.send_replace(BrokerStatus::Connected);
                self.flush();
            }
            BrokerEvent::ConnectionLost => {
                if self.connected {
                    tracing::warn!("broker connection lost, buffering");
                }
                self.connected = false;
                self.report_disconnected();
            }
            BrokerEvent::MessageArrived { topic, payload } => {
                tracing::debug!(%topic, bytes = payload.len(), "message arrived");
            }
        }
    }

    /// Send everything buffered, oldest first. Stops at the first failure and
    /// keeps the rest in order.
    fn flush(&mut self) {
        let mut sent = 0usize;
        while let Some(message) = self.buffer.pop_front() {
            if let Err(err) = self.client.publish(&message.topic, &message.payload) {
                tracing::warn!(error = %err, remaining = self.buffer.len() + 1, "flush interrupted");
                self.buffer.restore(message);
                break;
            }
            sent += 1;
        }
        if sent > 0 {
            tracing::info!(sent, "flushed buffered messages");
        }
    }

    fn enqueue(&mut self, message: OutboundMessage) {
        if let Some(evicted) = self.buffer.push(message) {
            tracing::debug!(seq = evicted.seq, topic = %evicted.topic, "buffer full, dropped oldest message");
        }
        if !self.connected {
            self.report_disconnected();
        }
    }

    fn report_disconnected(&self) {
        self.status.send_replace(BrokerStatus::Disconnected {
            buffered: self.buffer.len(),
        });
    }

    /// Spawn the bridge on its own task.
    ///
    /// The task ends when the session event bus closes.
    pub fn start(
        self,
        events: broadcast::Receiver<SessionEvent>,
        broker_events: mpsc::Receiver<BrokerEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(events, broker_events))
    }

    async fn run(
        mut self,
        mut events: broadcast::Receiver<SessionEvent>,
        mut broker_events: mpsc::Receiver<BrokerEvent>,
    ) {
        loop {
            tokio::select! {
                biased;
                Some(event) = broker_events.recv() => self.handle_broker_event(event),
                event = events.recv() => match event {
                    Ok(event) => self.handle_event(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "bridge fell behind session events");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        tracing::debug!(buffered = self.buffer.len(), "event bridge stopped");
    }
}
