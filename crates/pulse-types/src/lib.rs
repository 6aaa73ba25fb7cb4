//! # Pulse Types
//!
//! Shared definitions for the Restaurant Pulse workspace.
//!
//! ## Contents
//!
//! - [`frames`]: the JSON push frame schema and its validation
//! - [`resources`]: resource keys for the pull endpoints and scrape commands
//! - [`entities`]: DTOs returned by the REST endpoints
//! - [`errors`]: frame validation errors
//!
//! ## Push Frame Schema
//!
//! ```text
//! { type: "connection_established"|"restaurant_update"|"system_status"|"error"|"ping",
//!   timestamp: ISO-8601 string,
//!   restaurant?: string,
//!   update_type?: "menu"|"reviews"|"status",
//!   data?: object,
//!   message?: string,
//!   error?: string }
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod entities;
pub mod errors;
pub mod frames;
pub mod resources;

pub use entities::{CommandAck, HealthReport, RestaurantSummary, ScrapeFailure, ScrapingStatus};
pub use errors::FrameError;
pub use frames::{FrameKind, FrameTimestamp, PushFrame, UpdateType};
pub use resources::{ResourceKey, ResourceKind, ScrapeCommand};
