//! Connection state and the events the connection manager emits.

use std::fmt;
use tokio::time::Instant;

/// Lifecycle state of the push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Automatic reconnection exhausted. Terminal until `reconnect()`.
    Failed,
}

impl ConnectionState {
    /// Numeric encoding for the connection state gauge.
    pub fn gauge_value(self) -> f64 {
        match self {
            Self::Disconnected => 0.0,
            Self::Connecting => 1.0,
            Self::Connected => 2.0,
            Self::Failed => 3.0,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Observable status of the push connection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Automatic retries made since the last successful open.
    pub reconnect_attempt: u32,
    /// Last inbound traffic of any kind on the current transport.
    pub last_activity: Option<Instant>,
    /// Incremented on every successful open.
    pub epoch: u64,
    /// Set by `disconnect()`, cleared by `connect()`/`reconnect()`.
    pub manually_closed: bool,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

/// Ordered output of the connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The status changed; carries the status after the transition.
    StateChanged(ConnectionStatus),
    /// A text frame arrived on the transport opened in `epoch`.
    Frame { epoch: u64, text: String },
    /// Transient connectivity failure; a retry may follow.
    TransientError(String),
    /// Automatic reconnection gave up. Emitted once per exhausted sequence.
    Exhausted { attempts: u32 },
}
