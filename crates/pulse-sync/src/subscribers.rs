//! # Subscriber Registry
//!
//! Callback registry shared by the message router and the coordinator.
//!
//! Delivery iterates over a copy of the registry taken before the first
//! callback runs, so callbacks may subscribe or unsubscribe freely. A
//! panicking callback is caught and counted; the remaining subscribers still
//! receive the event.

use parking_lot::Mutex;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tracing::warn;

/// Identifier of a registered subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Outcome of delivering one event to every subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

struct Registry<T> {
    next_id: u64,
    entries: Vec<(SubscriptionId, T)>,
}

trait Unsubscribe: Send + Sync {
    fn remove(&self, id: SubscriptionId) -> bool;
}

impl<T: Send> Unsubscribe for Mutex<Registry<T>> {
    fn remove(&self, id: SubscriptionId) -> bool {
        let mut registry = self.lock();
        let before = registry.entries.len();
        registry.entries.retain(|(entry_id, _)| *entry_id != id);
        registry.entries.len() != before
    }
}

/// Handle returned by `subscribe`.
///
/// Dropping the handle does NOT unsubscribe; call [`unsubscribe`](Self::unsubscribe).
#[must_use = "subscriptions stay registered until unsubscribe() is called"]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    registry: Weak<dyn Unsubscribe>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the subscription. Returns `false` if it was already removed or
    /// the owner is gone.
    pub fn unsubscribe(self) -> bool {
        self.registry
            .upgrade()
            .map(|registry| registry.remove(self.id))
            .unwrap_or(false)
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle").field("id", &self.id).finish()
    }
}

/// Ordered set of subscribers of type `T` (usually an `Arc` of a callback).
pub struct SubscriberSet<T> {
    label: &'static str,
    inner: Arc<Mutex<Registry<T>>>,
}

impl<T: Clone + Send + 'static> SubscriberSet<T> {
    /// `label` names the registry in logs and metrics.
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            inner: Arc::new(Mutex::new(Registry {
                next_id: 1,
                entries: Vec::new(),
            })),
        }
    }

    pub fn insert(&self, subscriber: T) -> SubscriptionHandle {
        let id = {
            let mut registry = self.inner.lock();
            let id = SubscriptionId(registry.next_id);
            registry.next_id += 1;
            registry.entries.push((id, subscriber));
            id
        };

        let inner: Arc<dyn Unsubscribe> = self.inner.clone();
        SubscriptionHandle {
            id,
            registry: Arc::downgrade(&inner),
        }
    }

    pub fn remove(&self, id: SubscriptionId) -> bool {
        self.inner.remove(id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call `deliver` for every subscriber in registration order, isolating
    /// panics. `deliver` returns `false` to skip a subscriber (filtered out).
    pub fn deliver<F>(&self, mut deliver: F) -> DeliveryReport
    where
        F: FnMut(&T) -> bool,
    {
        let entries: Vec<(SubscriptionId, T)> = self.inner.lock().entries.clone();
        let mut report = DeliveryReport::default();

        for (id, subscriber) in &entries {
            match catch_unwind(AssertUnwindSafe(|| deliver(subscriber))) {
                Ok(true) => report.delivered += 1,
                Ok(false) => {}
                Err(panic) => {
                    report.failed += 1;
                    pulse_telemetry::metrics::SUBSCRIBER_PANICS
                        .with_label_values(&[self.label])
                        .inc();
                    warn!(
                        registry = self.label,
                        subscription = %id,
                        panic = panic_message(panic.as_ref()),
                        "Subscriber panicked"
                    );
                }
            }
        }

        report
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
