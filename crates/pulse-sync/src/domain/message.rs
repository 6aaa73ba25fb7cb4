//! Validated inbound messages and subscriber filters.

use chrono::{DateTime, NaiveDateTime, Utc};
use pulse_types::{FrameKind, PushFrame};

/// A push frame that passed validation, stamped on receipt.
///
/// Immutable once built; shared between the event log and subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Per-router monotonic sequence number.
    pub sequence: u64,
    /// Connection epoch the frame arrived on.
    pub epoch: u64,
    /// Local wall-clock receipt time.
    pub received_at: DateTime<Utc>,
    pub frame: PushFrame,
}

impl InboundMessage {
    pub fn new(frame: PushFrame, sequence: u64, epoch: u64) -> Self {
        Self {
            sequence,
            epoch,
            received_at: Utc::now(),
            frame,
        }
    }

    pub fn kind(&self) -> &FrameKind {
        &self.frame.kind
    }

    pub fn restaurant(&self) -> Option<&str> {
        self.frame.restaurant.as_deref()
    }

    /// Server timestamp normalized to naive UTC.
    pub fn server_timestamp(&self) -> NaiveDateTime {
        self.frame.timestamp.naive_utc()
    }

    /// Field of the `data` object, if present.
    pub fn data_field(&self, field: &str) -> Option<&serde_json::Value> {
        self.frame.data.as_ref().and_then(|data| data.get(field))
    }
}

/// Filter for subscribing to specific message kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    /// Kinds to include. Empty means all kinds, including unknown ones.
    pub kinds: Vec<FrameKind>,
}

impl EventFilter {
    /// Create a filter that accepts all messages.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific kinds.
    #[must_use]
    pub fn kinds(kinds: Vec<FrameKind>) -> Self {
        Self { kinds }
    }

    /// Check if a message kind matches this filter.
    ///
    /// Unknown kinds only reach unfiltered subscribers.
    #[must_use]
    pub fn matches(&self, kind: &FrameKind) -> bool {
        self.kinds.is_empty() || (kind.is_known() && self.kinds.contains(kind))
    }
}
