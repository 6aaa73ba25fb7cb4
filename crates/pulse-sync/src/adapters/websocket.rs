//! WebSocket adapter for the push channel.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::TransportError;
use crate::ports::{PushConnector, PushTransport, TransportEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens push transports with `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PushConnector for WebSocketConnector {
    async fn open(&self, url: &str) -> Result<Box<dyn PushTransport>, TransportError> {
        let (stream, response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        debug!(url, status = %response.status(), "WebSocket handshake complete");
        Ok(Box::new(WebSocketTransport { stream }))
    }
}

struct WebSocketTransport {
    stream: WsStream,
}

#[async_trait]
impl PushTransport for WebSocketTransport {
    async fn next_event(&mut self) -> Option<Result<TransportEvent, TransportError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(err) => return Some(Err(transport_error(err))),
            };

            let event = match message {
                Message::Text(text) => TransportEvent::Text(text.as_str().to_owned()),
                // tungstenite queues the pong itself.
                Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => TransportEvent::Activity,
                Message::Close(frame) => {
                    TransportEvent::Closed(frame.map(|frame| frame.reason.as_str().to_owned()))
                }
                Message::Frame(_) => continue,
            };
            return Some(Ok(event));
        }
    }

    async fn send_probe(&mut self) -> Result<(), TransportError> {
        self.stream
            .send(Message::Ping(Default::default()))
            .await
            .map_err(transport_error)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.stream.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(err) => Err(transport_error(err)),
        }
    }
}

fn transport_error(err: WsError) -> TransportError {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
        other => TransportError::Protocol(other.to_string()),
    }
}
