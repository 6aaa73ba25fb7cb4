//! Cross-component flows over real sockets.

pub mod fixtures;

mod cache_coherency;
mod push_pipeline;
mod reconnect;
