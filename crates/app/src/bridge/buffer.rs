//! Bounded drop-oldest buffer for messages held while the broker is away.

use std::collections::VecDeque;

/// One message awaiting publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Enqueue order.
    pub seq: u64,
    pub topic: String,
    pub payload: String,
}

/// FIFO with a fixed capacity. When full, pushing evicts the oldest entry.
/// Lives in memory only.
#[derive(Debug)]
pub struct OutboundBuffer {
    messages: VecDeque<OutboundMessage>,
    capacity: usize,
    evicted: u64,
}

impl OutboundBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            evicted: 0,
        }
    }

    /// Append a message, returning whatever had to be evicted to make room.
    /// With a capacity of zero the message itself is returned.
    pub fn push(&mut self, message: OutboundMessage) -> Option<OutboundMessage> {
        if self.capacity == 0 {
            self.evicted += 1;
            return Some(message);
        }
        let evicted = if self.messages.len() >= self.capacity {
            self.evicted += 1;
            self.messages.pop_front()
        } else {
            None
        };
        self.messages.push_back(message);
        evicted
    }

    /// Put back a message that was taken off the front but could not be sent.
    pub fn restore(&mut self, message: OutboundMessage) {
        self.messages.push_front(message);
    }

    pub fn pop_front(&mut self) -> Option<OutboundMessage> {
        self.messages.pop_front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total messages evicted since creation.
    #[must_use]
    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}
