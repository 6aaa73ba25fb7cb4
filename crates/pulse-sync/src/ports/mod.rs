//! Ports (hexagonal architecture).

pub mod outbound;

pub use outbound::{DashboardApi, PushConnector, PushTransport, TransportEvent};
