//! Domain layer: pure types and rules, no I/O.

pub mod event_log;
pub mod message;
pub mod policy;
pub mod projection;
pub mod status;

pub use event_log::{EventLog, DEFAULT_LOG_CAPACITY};
pub use message::{EventFilter, InboundMessage};
pub use policy::ReconnectPolicy;
pub use projection::{
    superseded_resources, ConnectionView, DashboardSnapshot, PulledResource, Record, Revision,
    ServerError, Source, SyncChange, TrackedValue,
};
pub use status::{ConnectionEvent, ConnectionState, ConnectionStatus};
