//! WebSocket client transport over tokio-tungstenite.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use dashlink_core::AppResult;
use dashlink_core::error::{AppError, ErrorKind};

use super::{Connector, Transport};

/// Connects to `ws://` / `wss://` endpoints.
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl WsConnector {
    /// Create a connector.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> AppResult<Box<dyn Transport>> {
        debug!(url = %redact(url), "Opening WebSocket");

        let (stream, response) = connect_async(url).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Transport,
                format!("WebSocket connect failed: {e}"),
                e,
            )
        })?;

        debug!(status = %response.status(), "WebSocket handshake complete");
        Ok(Box::new(WsTransport {
            stream,
            closed: false,
        }))
    }
}

/// An open WebSocket connection.
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, frame: String) -> AppResult<()> {
        self.stream
            .send(Message::text(frame))
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Transport, format!("Send failed: {e}"), e))
    }

    async fn recv(&mut self) -> Option<AppResult<String>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => {
                    return Some(Err(AppError::with_source(
                        ErrorKind::Transport,
                        format!("WebSocket error: {e}"),
                        e,
                    )));
                }
            };
            match classify(message) {
                Inbound::Text(text) => return Some(Ok(text)),
                Inbound::Closed => {
                    self.closed = true;
                    return None;
                }
                Inbound::Skip => continue,
            }
        }
    }

    async fn close(&mut self) -> AppResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Transport, format!("Close failed: {e}"), e))
    }
}

/// What one WebSocket message means to the channel.
#[derive(Debug, PartialEq, Eq)]
enum Inbound {
    Text(String),
    Closed,
    Skip,
}

/// Only text frames carry channel messages.
fn classify(message: Message) -> Inbound {
    match message {
        Message::Text(text) => Inbound::Text(text.as_str().to_owned()),
        Message::Binary(data) => {
            warn!(len = data.len(), "Dropping binary frame");
            Inbound::Skip
        }
        Message::Close(frame) => {
            debug!(?frame, "Peer closed WebSocket");
            Inbound::Closed
        }
        // Ping replies are queued by tungstenite itself
        _ => Inbound::Skip,
    }
}

/// Strip the query string so credentials never reach the logs.
pub(crate) fn redact(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}
