//! # Message Router
//!
//! Validates raw push frames, stamps them, keeps the bounded event log and
//! fans messages out to filtered subscribers.
//!
//! Frames of one connection epoch are handled strictly in arrival order.
//! Heartbeats are consumed here; malformed frames are dropped and counted.

use parking_lot::Mutex;
use pulse_telemetry::metrics::{FRAMES_MALFORMED, FRAMES_RECEIVED, MESSAGES_DELIVERED};
use pulse_types::{FrameError, PushFrame};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::{EventFilter, EventLog, InboundMessage};
use crate::subscribers::{SubscriberSet, SubscriptionHandle, SubscriptionId};

/// Callback invoked for each delivered message.
pub type MessageCallback = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

struct MessageSubscriber {
    filter: EventFilter,
    callback: MessageCallback,
}

#[derive(Default)]
struct RouterCounters {
    received: AtomicU64,
    delivered: AtomicU64,
    malformed: AtomicU64,
    heartbeats: AtomicU64,
    subscriber_failures: AtomicU64,
}

/// Router statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    /// Frames handed to the router, valid or not.
    pub received: u64,
    /// Successful callback invocations.
    pub delivered: u64,
    pub malformed: u64,
    pub heartbeats: u64,
    /// Callbacks that panicked.
    pub subscriber_failures: u64,
}

/// Push message router.
pub struct MessageRouter {
    log: Mutex<EventLog>,
    sequence: AtomicU64,
    subscribers: SubscriberSet<Arc<MessageSubscriber>>,
    counters: RouterCounters,
}

impl MessageRouter {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            log: Mutex::new(EventLog::with_capacity(log_capacity)),
            sequence: AtomicU64::new(0),
            subscribers: SubscriberSet::new("messages"),
            counters: RouterCounters::default(),
        }
    }

    /// Validate and stamp a raw frame and append it to the log.
    ///
    /// Returns `Ok(None)` for heartbeats, which are neither logged nor
    /// forwarded.
    ///
    /// # Errors
    ///
    /// The [`FrameError`] of a malformed frame. The frame is counted and
    /// dropped.
    pub fn ingest(&self, raw: &str, epoch: u64) -> Result<Option<Arc<InboundMessage>>, FrameError> {
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        FRAMES_RECEIVED.inc();

        let frame = match PushFrame::parse(raw) {
            Ok(frame) => frame,
            Err(err) => {
                self.counters.malformed.fetch_add(1, Ordering::Relaxed);
                FRAMES_MALFORMED.inc();
                warn!(epoch, error = %err, "Dropping malformed frame");
                return Err(err);
            }
        };

        if frame.kind.is_heartbeat() {
            self.counters.heartbeats.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let message = Arc::new(InboundMessage::new(frame, sequence, epoch));
        debug!(
            epoch,
            sequence,
            kind = %message.kind(),
            restaurant = message.restaurant().unwrap_or("-"),
            "Frame accepted"
        );

        self.log.lock().push(message.clone());
        Ok(Some(message))
    }

    /// Deliver a message to every subscriber whose filter matches, in
    /// registration order. Returns the number of successful deliveries.
    pub fn dispatch(&self, message: &InboundMessage) -> usize {
        let report = self.subscribers.deliver(|subscriber| {
            if !subscriber.filter.matches(message.kind()) {
                return false;
            }
            (subscriber.callback)(message);
            true
        });

        self.counters
            .delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.counters
            .subscriber_failures
            .fetch_add(report.failed as u64, Ordering::Relaxed);
        MESSAGES_DELIVERED.inc_by(report.delivered as f64);
        report.delivered
    }

    /// [`ingest`](Self::ingest) then [`dispatch`](Self::dispatch).
    pub fn route(&self, raw: &str, epoch: u64) -> Result<Option<Arc<InboundMessage>>, FrameError> {
        let message = self.ingest(raw, epoch)?;
        if let Some(message) = &message {
            self.dispatch(message);
        }
        Ok(message)
    }

    pub fn subscribe<F>(&self, filter: EventFilter, callback: F) -> SubscriptionHandle
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        debug!(kinds = ?filter.kinds, "New message subscription");
        self.subscribers.insert(Arc::new(MessageSubscriber {
            filter,
            callback: Arc::new(callback),
        }))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.remove(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Logged messages, oldest first.
    pub fn recent_events(&self) -> Vec<Arc<InboundMessage>> {
        self.log.lock().entries()
    }

    pub fn clear_log(&self) {
        self.log.lock().clear();
    }

    pub fn set_log_capacity(&self, capacity: usize) {
        self.log.lock().set_capacity(capacity);
    }

    pub fn log_capacity(&self) -> usize {
        self.log.lock().capacity()
    }

    pub fn stats(&self) -> RouterStats {
        RouterStats {
            received: self.counters.received.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            malformed: self.counters.malformed.load(Ordering::Relaxed),
            heartbeats: self.counters.heartbeats.load(Ordering::Relaxed),
            subscriber_failures: self.counters.subscriber_failures.load(Ordering::Relaxed),
        }
    }
}
