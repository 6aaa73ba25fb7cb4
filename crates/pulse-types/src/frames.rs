//! # Push Frames
//!
//! Typed view of the JSON frames sent over the push channel, plus the
//! validation that decides whether a frame is deliverable at all.

use crate::errors::FrameError;
use chrono::{DateTime, NaiveDateTime};
use serde_json::{Map, Value};
use std::fmt;

/// `type` discriminator of a push frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Greeting sent by the server right after the socket opens.
    ConnectionEstablished,
    /// Scraping result for a single restaurant.
    RestaurantUpdate,
    /// Scraper started/stopped.
    SystemStatus,
    /// Server-side error report.
    Error,
    /// Liveness traffic (`ping` or `heartbeat`).
    Heartbeat,
    /// Streamed server log line.
    Log,
    /// Scraper moved on to the next restaurant.
    ScrapingStart,
    /// A full scraping cycle finished.
    ScrapingCycleComplete,
    /// Any type this client does not know about.
    Other(String),
}

impl FrameKind {
    /// Map a wire `type` string to a kind.
    pub fn from_wire(value: &str) -> Self {
        match value {
            "connection_established" => Self::ConnectionEstablished,
            "restaurant_update" => Self::RestaurantUpdate,
            "system_status" => Self::SystemStatus,
            "error" => Self::Error,
            "ping" | "heartbeat" => Self::Heartbeat,
            "log" => Self::Log,
            "scraping_start" => Self::ScrapingStart,
            "scraping_cycle_complete" => Self::ScrapingCycleComplete,
            other => Self::Other(other.to_string()),
        }
    }

    /// Wire name of this kind.
    pub fn as_wire(&self) -> &str {
        match self {
            Self::ConnectionEstablished => "connection_established",
            Self::RestaurantUpdate => "restaurant_update",
            Self::SystemStatus => "system_status",
            Self::Error => "error",
            Self::Heartbeat => "ping",
            Self::Log => "log",
            Self::ScrapingStart => "scraping_start",
            Self::ScrapingCycleComplete => "scraping_cycle_complete",
            Self::Other(name) => name,
        }
    }

    /// Whether this kind is part of the known schema.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }

    /// Whether this frame only carries liveness information.
    pub fn is_heartbeat(&self) -> bool {
        matches!(self, Self::Heartbeat)
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Section of restaurant data a `restaurant_update` refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UpdateType {
    Menu,
    Reviews,
    Status,
    Other(String),
}

impl UpdateType {
    pub fn from_wire(value: &str) -> Self {
        match value {
            "menu" => Self::Menu,
            "reviews" => Self::Reviews,
            "status" => Self::Status,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            Self::Menu => "menu",
            Self::Reviews => "reviews",
            Self::Status => "status",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Server-supplied timestamp, kept verbatim alongside its UTC reading.
///
/// Accepts RFC 3339 (offset normalized to UTC) and the naive
/// `YYYY-MM-DDTHH:MM:SS[.ffffff]` form produced by Python's `isoformat()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameTimestamp {
    raw: String,
    naive_utc: NaiveDateTime,
}

impl FrameTimestamp {
    pub fn parse(value: &str) -> Result<Self, FrameError> {
        let naive_utc = DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.naive_utc())
            .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
            .map_err(|_| FrameError::InvalidTimestamp {
                value: value.to_string(),
            })?;

        Ok(Self {
            raw: value.to_string(),
            naive_utc,
        })
    }

    /// The timestamp exactly as sent.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn naive_utc(&self) -> NaiveDateTime {
        self.naive_utc
    }
}

impl fmt::Display for FrameTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A push frame that passed schema validation.
#[derive(Debug, Clone, PartialEq)]
pub struct PushFrame {
    pub kind: FrameKind,
    pub timestamp: FrameTimestamp,
    pub restaurant: Option<String>,
    pub update_type: Option<UpdateType>,
    pub data: Option<Map<String, Value>>,
    pub message: Option<String>,
    pub error: Option<String>,
    /// Top-level fields outside the core schema (`progress`, `level`, ...).
    pub extra: Map<String, Value>,
}

impl PushFrame {
    /// Parse and validate a raw text frame.
    ///
    /// # Errors
    ///
    /// Any [`FrameError`]; the frame must then be dropped as malformed.
    pub fn parse(raw: &str) -> Result<Self, FrameError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| FrameError::InvalidJson(e.to_string()))?;
        let Value::Object(mut object) = value else {
            return Err(FrameError::NotAnObject);
        };

        let kind = match object.remove("type") {
            Some(Value::String(kind)) => FrameKind::from_wire(&kind),
            None | Some(Value::Null) => return Err(FrameError::MissingType),
            Some(other) => {
                return Err(FrameError::InvalidField {
                    field: "type",
                    reason: format!("expected string, got {other}"),
                })
            }
        };

        let timestamp = match object.remove("timestamp") {
            Some(Value::String(ts)) => FrameTimestamp::parse(&ts)?,
            None | Some(Value::Null) => {
                return Err(FrameError::MissingTimestamp {
                    kind: kind.as_wire().to_string(),
                })
            }
            Some(other) => {
                return Err(FrameError::InvalidTimestamp {
                    value: other.to_string(),
                })
            }
        };

        let restaurant = take_string(&mut object, "restaurant")?;
        let update_type = take_string(&mut object, "update_type")?.map(|t| UpdateType::from_wire(&t));
        let data = match object.remove("data") {
            None | Some(Value::Null) => None,
            Some(Value::Object(data)) => Some(data),
            Some(other) => {
                return Err(FrameError::InvalidField {
                    field: "data",
                    reason: format!("expected object, got {other}"),
                })
            }
        };
        let message = take_string(&mut object, "message")?;
        let error = take_string(&mut object, "error")?;

        Ok(Self {
            kind,
            timestamp,
            restaurant,
            update_type,
            data,
            message,
            error,
            extra: object,
        })
    }
}

fn take_string(
    object: &mut Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, FrameError> {
    match object.remove(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value)),
        Some(other) => Err(FrameError::InvalidField {
            field,
            reason: format!("expected string, got {other}"),
        }),
    }
}
