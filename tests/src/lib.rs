//! # Restaurant Pulse Test Suite
//!
//! Integration tests running the sync client against real local servers.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── fixtures.rs         # WebSocket push server + axum REST stub
//!     ├── push_pipeline.rs    # frames → router → snapshot → subscribers
//!     ├── reconnect.rs        # close, heartbeat timeout, exhaustion
//!     └── cache_coherency.rs  # pull cache vs push invalidation
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p pulse-tests
//! cargo test -p pulse-tests integration::reconnect::
//! ```

pub mod integration;
