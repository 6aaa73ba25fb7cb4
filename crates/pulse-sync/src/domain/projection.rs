//! # Dashboard Projection
//!
//! The merged local view of server state. Push deltas and pull snapshots are
//! written field by field; each field remembers the revision that wrote it.
//!
//! ## Ordering
//!
//! Every applied push takes the next revision. A pull carries the revision
//! current when its fetch was issued and only overwrites fields whose revision
//! is not newer, so a snapshot requested before a push never clobbers it.

use chrono::{DateTime, Utc};
use pulse_types::{
    FrameKind, HealthReport, PushFrame, ResourceKey, RestaurantSummary, ScrapingStatus,
    UpdateType,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::message::InboundMessage;
use super::status::{ConnectionState, ConnectionStatus};

/// Position in the projection's write order.
pub type Revision = u64;

/// Which side of the sync last wrote a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Push,
    Pull,
}

/// A field value plus the revision that wrote it.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedValue {
    pub value: Value,
    pub revision: Revision,
    pub source: Source,
}

/// Field name to tracked value, merged last-writer-wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: BTreeMap<String, TrackedValue>,
}

impl Record {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).map(|tracked| &tracked.value)
    }

    pub fn tracked(&self, field: &str) -> Option<&TrackedValue> {
        self.fields.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &TrackedValue)> {
        self.fields.iter().map(|(name, tracked)| (name.as_str(), tracked))
    }

    /// Write a pushed value. Pushes always win.
    pub fn apply_push(&mut self, field: impl Into<String>, value: Value, revision: Revision) {
        self.fields.insert(
            field.into(),
            TrackedValue {
                value,
                revision,
                source: Source::Push,
            },
        );
    }

    /// Write a pulled value unless a newer write exists. Returns whether the
    /// stored value changed.
    pub fn apply_pull(&mut self, field: &str, value: Value, issued_at: Revision) -> bool {
        match self.fields.get_mut(field) {
            Some(existing) if existing.revision > issued_at => false,
            Some(existing) => {
                let changed = existing.value != value;
                existing.value = value;
                existing.revision = issued_at;
                existing.source = Source::Pull;
                changed
            }
            None => {
                self.fields.insert(
                    field.to_string(),
                    TrackedValue {
                        value,
                        revision: issued_at,
                        source: Source::Pull,
                    },
                );
                true
            }
        }
    }

    /// Merge every field of a pulled object. Returns the number changed.
    fn merge_pull(&mut self, object: &Map<String, Value>, issued_at: Revision) -> usize {
        object
            .iter()
            .filter(|(field, value)| self.apply_pull(field, (*value).clone(), issued_at))
            .count()
    }

    /// Current values as a JSON object.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(name, tracked)| (name.clone(), tracked.value.clone()))
                .collect(),
        )
    }
}

/// Connection fields surfaced to snapshot readers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionView {
    pub state: ConnectionState,
    pub reconnect_attempt: u32,
    pub epoch: u64,
}

/// Error reported by the server over the push channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerError {
    pub message: String,
    pub restaurant: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Pull-only resource body (analytics, trends, health).
#[derive(Debug, Clone, PartialEq)]
pub struct PulledResource {
    pub value: Value,
    pub revision: Revision,
}

/// What a single applied change did. Delivered to coordinator subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncChange {
    /// The push connection changed state.
    Connection(ConnectionState),
    /// Automatic reconnection gave up.
    ConnectionFailed { attempts: u32 },
    /// The server greeted a new connection.
    Established { message: Option<String> },
    /// A restaurant record was patched by a push.
    RestaurantPatched {
        name: String,
        update_type: Option<UpdateType>,
    },
    /// The scraping status record was patched by a push.
    StatusPatched(FrameKind),
    /// The server reported an error.
    ServerError { message: String },
    /// A pull result was merged.
    ResourceLoaded(ResourceKey),
}

/// Best-known state of the dashboard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardSnapshot {
    pub connection: ConnectionView,
    pub restaurants: BTreeMap<String, Record>,
    pub scraping_status: Record,
    pub resources: BTreeMap<ResourceKey, PulledResource>,
    pub last_error: Option<ServerError>,
    /// Set once reconnection is exhausted, cleared on the next connect.
    pub connection_failed: bool,
    pub malformed_frames: u64,
    pub last_message_at: Option<DateTime<Utc>>,
    /// Incremented once per applied change.
    pub version: u64,
    /// Logical clock, advanced by every push write and every issued pull.
    pub revision: Revision,
}

impl DashboardSnapshot {
    /// Whether the push connection is down and the view may be stale.
    pub fn is_degraded(&self) -> bool {
        self.connection.state != ConnectionState::Connected
    }

    pub fn restaurant(&self, name: &str) -> Option<&Record> {
        self.restaurants.get(name)
    }

    /// Typed view of a restaurant record. Fields pushed outside the REST
    /// schema are ignored.
    pub fn restaurant_summary(&self, name: &str) -> Option<RestaurantSummary> {
        let record = self.restaurants.get(name)?;
        let mut summary: RestaurantSummary = serde_json::from_value(record.to_json()).ok()?;
        if summary.name.is_empty() {
            summary.name = name.to_string();
        }
        Some(summary)
    }

    /// Typed view of the scraping status record.
    pub fn status(&self) -> Option<ScrapingStatus> {
        if self.scraping_status.is_empty() {
            return None;
        }
        serde_json::from_value(self.scraping_status.to_json()).ok()
    }

    pub fn health(&self) -> Option<HealthReport> {
        self.resources
            .get(&ResourceKey::Health)
            .and_then(|resource| serde_json::from_value(resource.value.clone()).ok())
    }

    pub fn resource(&self, key: &ResourceKey) -> Option<&Value> {
        self.resources.get(key).map(|resource| &resource.value)
    }

    /// Record a connection status. Returns the change when the state moved.
    pub fn apply_connection(&mut self, status: &ConnectionStatus) -> Option<SyncChange> {
        let previous = self.connection.state;
        self.connection = ConnectionView {
            state: status.state,
            reconnect_attempt: status.reconnect_attempt,
            epoch: status.epoch,
        };
        if matches!(
            status.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            self.connection_failed = false;
        }

        // Exhaustion surfaces once, through `apply_exhausted`.
        if previous == status.state || status.state == ConnectionState::Failed {
            return None;
        }
        self.version += 1;
        Some(SyncChange::Connection(status.state))
    }

    pub fn apply_exhausted(&mut self, attempts: u32) -> SyncChange {
        self.connection_failed = true;
        self.connection.state = ConnectionState::Failed;
        self.version += 1;
        SyncChange::ConnectionFailed { attempts }
    }

    pub fn record_malformed(&mut self) {
        self.malformed_frames += 1;
    }

    /// Apply a validated push message. Returns `None` for messages that do
    /// not touch the projection (logs, unknown kinds, incomplete updates).
    pub fn apply_push(&mut self, message: &InboundMessage) -> Option<SyncChange> {
        self.last_message_at = Some(message.received_at);
        let frame = &message.frame;

        let change = match &frame.kind {
            FrameKind::ConnectionEstablished => SyncChange::Established {
                message: frame.message.clone(),
            },
            FrameKind::RestaurantUpdate => {
                let name = frame.restaurant.clone()?;
                let revision = self.next_revision();
                let record = self.restaurants.entry(name.clone()).or_default();
                for (field, value) in frame.data.iter().flatten() {
                    record.apply_push(field.clone(), value.clone(), revision);
                }
                record.apply_push(
                    "updated_at",
                    Value::String(frame.timestamp.raw().to_string()),
                    revision,
                );
                if let Some(update_type) = &frame.update_type {
                    record.apply_push(
                        "last_update_type",
                        Value::String(update_type.as_wire().to_string()),
                        revision,
                    );
                }
                SyncChange::RestaurantPatched {
                    name,
                    update_type: frame.update_type.clone(),
                }
            }
            FrameKind::SystemStatus => {
                let data = frame.data.as_ref()?;
                let revision = self.next_revision();
                for (field, value) in data {
                    self.scraping_status
                        .apply_push(field.clone(), value.clone(), revision);
                }
                SyncChange::StatusPatched(FrameKind::SystemStatus)
            }
            FrameKind::ScrapingStart => {
                let revision = self.next_revision();
                let status = &mut self.scraping_status;
                status.apply_push("is_running", Value::Bool(true), revision);
                status.apply_push(
                    "current_restaurant",
                    frame.restaurant.clone().map_or(Value::Null, Value::String),
                    revision,
                );
                for field in ["progress", "restaurant_number", "total_restaurants"] {
                    if let Some(value) = frame.extra.get(field) {
                        status.apply_push(field, value.clone(), revision);
                    }
                }
                SyncChange::StatusPatched(FrameKind::ScrapingStart)
            }
            FrameKind::ScrapingCycleComplete => {
                let revision = self.next_revision();
                let status = &mut self.scraping_status;
                status.apply_push("current_restaurant", Value::Null, revision);
                status.apply_push("progress", Value::from(100), revision);
                status.apply_push(
                    "last_scrape_time",
                    Value::String(frame.timestamp.raw().to_string()),
                    revision,
                );
                for field in [
                    "restaurants_scraped",
                    "errors_count",
                    "cycle_duration",
                    "next_cycle",
                ] {
                    if let Some(value) = frame.extra.get(field) {
                        status.apply_push(field, value.clone(), revision);
                    }
                }
                SyncChange::StatusPatched(FrameKind::ScrapingCycleComplete)
            }
            FrameKind::Error => {
                let text = frame
                    .error
                    .clone()
                    .or_else(|| frame.message.clone())
                    .unwrap_or_else(|| "unknown server error".to_string());
                self.last_error = Some(ServerError {
                    message: text.clone(),
                    restaurant: frame.restaurant.clone(),
                    received_at: message.received_at,
                });
                SyncChange::ServerError { message: text }
            }
            FrameKind::Heartbeat | FrameKind::Log | FrameKind::Other(_) => return None,
        };

        self.version += 1;
        Some(change)
    }

    /// Reserve the revision of a pull about to be issued. Writes applied
    /// later, push or pull, order after it.
    pub fn issue_pull(&mut self) -> Revision {
        self.next_revision()
    }

    /// Merge a pulled resource issued at `issued_at`. Returns `None` when no
    /// field changed (a newer write won, or the value was already merged).
    pub fn apply_pull(
        &mut self,
        key: &ResourceKey,
        value: &Value,
        issued_at: Revision,
    ) -> Option<SyncChange> {
        let changed = match key {
            ResourceKey::Restaurants => {
                let mut changed = 0;
                for row in value.as_array().into_iter().flatten() {
                    let Some(object) = row.as_object() else {
                        continue;
                    };
                    let Some(name) = object.get("name").and_then(Value::as_str) else {
                        continue;
                    };
                    changed += self
                        .restaurants
                        .entry(name.to_string())
                        .or_default()
                        .merge_pull(object, issued_at);
                }
                changed > 0
            }
            ResourceKey::Restaurant(name) => value.as_object().is_some_and(|object| {
                self.restaurants
                    .entry(name.clone())
                    .or_default()
                    .merge_pull(object, issued_at)
                    > 0
            }),
            ResourceKey::Status => value
                .as_object()
                .is_some_and(|object| self.scraping_status.merge_pull(object, issued_at) > 0),
            ResourceKey::Analytics | ResourceKey::Trends | ResourceKey::Health => {
                match self.resources.get_mut(key) {
                    Some(existing) if existing.revision > issued_at => false,
                    Some(existing) => {
                        existing.revision = issued_at;
                        let changed = existing.value != *value;
                        existing.value = value.clone();
                        changed
                    }
                    None => {
                        self.resources.insert(
                            key.clone(),
                            PulledResource {
                                value: value.clone(),
                                revision: issued_at,
                            },
                        );
                        true
                    }
                }
            }
        };

        if !changed {
            return None;
        }
        self.version += 1;
        Some(SyncChange::ResourceLoaded(key.clone()))
    }

    fn next_revision(&mut self) -> Revision {
        self.revision += 1;
        self.revision
    }
}

/// Cache entries a push supersedes.
pub fn superseded_resources(frame: &PushFrame) -> Vec<ResourceKey> {
    match &frame.kind {
        FrameKind::RestaurantUpdate => {
            let mut keys = Vec::with_capacity(4);
            if let Some(name) = &frame.restaurant {
                keys.push(ResourceKey::restaurant(name.clone()));
            }
            keys.extend([
                ResourceKey::Restaurants,
                ResourceKey::Analytics,
                ResourceKey::Trends,
            ]);
            keys
        }
        FrameKind::SystemStatus | FrameKind::ScrapingStart => vec![ResourceKey::Status],
        FrameKind::ScrapingCycleComplete => vec![
            ResourceKey::Status,
            ResourceKey::Restaurants,
            ResourceKey::Analytics,
            ResourceKey::Trends,
        ],
        _ => Vec::new(),
    }
}
