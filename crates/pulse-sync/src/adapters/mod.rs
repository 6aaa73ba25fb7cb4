//! Adapters (hexagonal architecture): network implementations of the
//! outbound ports.

pub mod http;
pub mod websocket;

pub use http::HttpDashboardApi;
pub use websocket::WebSocketConnector;
