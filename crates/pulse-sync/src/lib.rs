//! # Pulse Sync
//!
//! Real-time synchronization client for the Restaurant Pulse dashboard.
//!
//! Keeps a local view of the scraping service consistent across an
//! unreliable WebSocket push channel and cached REST pull reads.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         SyncCoordinator                          │
//! │   DashboardSnapshot (last-writer-wins)  ◄── change subscribers   │
//! ├────────────────────┬─────────────────────┬───────────────────────┤
//! │ ConnectionManager  │   MessageRouter     │     CacheStore        │
//! │ backoff, heartbeat │ validate, EventLog  │ TTL, in-flight dedup  │
//! ├────────────────────┴─────────────────────┴───────────────────────┤
//! │  ports: PushConnector / PushTransport        DashboardApi        │
//! │  adapters: WebSocketConnector (tungstenite)  HttpDashboardApi    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use pulse_sync::{SyncConfig, SyncCoordinator};
//!
//! let client = SyncCoordinator::new(SyncConfig::resolve(None)?)?;
//! let _handle = client.subscribe(|change, snapshot| {
//!     println!("{change:?} -> v{}", snapshot.version);
//! });
//! client.start()?;
//! client.refresh().await;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod cache;
pub mod config;
pub mod connection;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod ports;
pub mod router;
pub mod subscribers;

#[cfg(test)]
pub(crate) mod testing;

pub use adapters::{HttpDashboardApi, WebSocketConnector};
pub use cache::{CacheStatsSnapshot, CacheStore};
pub use config::SyncConfig;
pub use connection::{ConnectionManager, ConnectionSettings};
pub use coordinator::{ChangeCallback, RefreshReport, SyncCoordinator};
pub use domain::{
    ConnectionEvent, ConnectionState, ConnectionStatus, DashboardSnapshot, EventFilter, EventLog,
    InboundMessage, ReconnectPolicy, Record, SyncChange,
};
pub use error::{ConfigError, ConnectionError, FetchError, SyncError, SyncResult, TransportError};
pub use ports::{DashboardApi, PushConnector, PushTransport, TransportEvent};
pub use router::{MessageCallback, MessageRouter, RouterStats};
pub use subscribers::{DeliveryReport, SubscriptionHandle, SubscriptionId};
