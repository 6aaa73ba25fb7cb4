//! # Error Types
//!
//! Error taxonomy of the sync client:
//!
//! - transient connectivity problems are retried and only surface as
//!   [`TransportError`]s inside connection events;
//! - malformed frames are dropped and counted (see `pulse_types::FrameError`);
//! - reconnect exhaustion is terminal ([`ConnectionError::Exhausted`]);
//! - fetch failures propagate to the awaiting caller ([`FetchError`]).

use std::time::Duration;
use thiserror::Error;

/// Failure of a pull read. `Clone` so one result can be shared by every
/// caller joined on the same in-flight fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Request could not be sent or the response not received.
    #[error("Network error: {0}")]
    Network(String),

    /// Fetch exceeded its deadline.
    #[error("Fetch timed out after {0:?}")]
    Timeout(Duration),

    /// Non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Server answered with an `{"error": ...}` body.
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// Response body did not match the expected shape.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Fetch task was cancelled or panicked.
    #[error("Fetch aborted: {0}")]
    Aborted(String),
}

impl FetchError {
    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Timeout(_) => "timeout",
            Self::Status { .. } => "status",
            Self::Rejected(_) => "rejected",
            Self::Decode(_) => "decode",
            Self::Aborted(_) => "aborted",
        }
    }
}

/// Errors returned by connection lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// Automatic reconnection gave up; only `reconnect()` leaves this state.
    #[error("Reconnection failed after {attempts} attempts")]
    Exhausted { attempts: u32 },

    /// The coordinator was shut down.
    #[error("Sync client is not running")]
    NotRunning,
}

/// Errors raised by a push transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection closed")]
    Closed,
}

/// Errors that can occur during config loading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("Failed to read config file {path}: {error}")]
    Io {
        /// Path of the file that failed to load.
        path: String,
        /// Error message from the I/O operation.
        error: String,
    },

    /// TOML parse error.
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// A value failed validation.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Umbrella error for coordinator operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result alias for coordinator operations.
pub type SyncResult<T> = Result<T, SyncError>;
