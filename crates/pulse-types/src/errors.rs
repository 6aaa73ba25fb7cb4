//! # Error Types
//!
//! Validation errors for inbound push frames.

use thiserror::Error;

/// Reasons a push frame is rejected as malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The frame is not valid JSON.
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    /// The frame is valid JSON but not an object.
    #[error("Frame is not a JSON object")]
    NotAnObject,

    /// The `type` discriminator is absent.
    #[error("Frame has no type")]
    MissingType,

    /// The `timestamp` field is absent.
    #[error("Frame of type {kind} has no timestamp")]
    MissingTimestamp { kind: String },

    /// The `timestamp` field is present but not ISO-8601.
    #[error("Invalid timestamp {value:?}")]
    InvalidTimestamp { value: String },

    /// A known field has the wrong JSON type.
    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}
