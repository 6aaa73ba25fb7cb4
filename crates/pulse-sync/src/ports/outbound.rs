//! Outbound ports: what the sync client needs from the outside world.

use async_trait::async_trait;
use pulse_types::{CommandAck, ResourceKey, ScrapeCommand};
use serde_json::Value;

use crate::error::{FetchError, TransportError};

/// Pull endpoints and scrape commands of the dashboard service.
#[async_trait]
pub trait DashboardApi: Send + Sync {
    /// Read one resource. The body is returned as JSON already checked
    /// against the resource's expected shape.
    async fn fetch(&self, key: &ResourceKey) -> Result<Value, FetchError>;

    /// Issue a scrape command. Never cached.
    async fn execute(&self, command: ScrapeCommand) -> Result<CommandAck, FetchError>;
}

/// Something received on an open push transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame.
    Text(String),
    /// Inbound traffic that carries no frame (pong, ping, binary).
    Activity,
    /// The remote closed the connection.
    Closed(Option<String>),
}

/// An open push connection.
#[async_trait]
pub trait PushTransport: Send {
    /// Next inbound event. `None` once the stream has ended.
    async fn next_event(&mut self) -> Option<Result<TransportEvent, TransportError>>;

    /// Send a liveness probe.
    async fn send_probe(&mut self) -> Result<(), TransportError>;

    /// Close the connection. Errors are ignored by callers.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens push transports.
#[async_trait]
pub trait PushConnector: Send + Sync {
    async fn open(&self, url: &str) -> Result<Box<dyn PushTransport>, TransportError>;
}
