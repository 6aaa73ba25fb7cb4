//! Bounded log of recently received messages.

use std::collections::VecDeque;
use std::sync::Arc;

use super::message::InboundMessage;

/// Default number of messages kept.
pub const DEFAULT_LOG_CAPACITY: usize = 100;

/// FIFO of the most recent messages, oldest first. Never exceeds `capacity`.
#[derive(Debug, Clone)]
pub struct EventLog {
    capacity: usize,
    entries: VecDeque<Arc<InboundMessage>>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl EventLog {
    /// A capacity of zero keeps nothing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_LOG_CAPACITY)),
        }
    }

    /// Append a message, evicting the oldest past capacity.
    pub fn push(&mut self, message: Arc<InboundMessage>) {
        self.entries.push_back(message);
        self.trim();
    }

    /// Change the capacity; shrinking evicts the oldest entries.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.trim();
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the log, oldest first.
    pub fn entries(&self) -> Vec<Arc<InboundMessage>> {
        self.entries.iter().cloned().collect()
    }

    fn trim(&mut self) {
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }
}
