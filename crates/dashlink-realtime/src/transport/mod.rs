//! Duplex text transports behind the channel manager.
//!
//! The manager only sees [`Connector`] and [`Transport`]; the WebSocket
//! client and the in-memory pair are interchangeable.

pub mod memory;
pub mod websocket;

use async_trait::async_trait;

use dashlink_core::AppResult;

pub use memory::{MemoryConnector, MemoryPeer};
pub use websocket::WsConnector;

/// Opens transport connections to a URI.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Establish a connection. Returns only once the transport is open.
    async fn connect(&self, url: &str) -> AppResult<Box<dyn Transport>>;
}

/// One established duplex text connection.
///
/// `recv` must be cancel-safe: the connection pump polls it inside
/// `tokio::select!`.
#[async_trait]
pub trait Transport: Send {
    /// Transmit one text frame.
    async fn send(&mut self, frame: String) -> AppResult<()>;

    /// Next inbound text frame. `None` once the peer has closed.
    async fn recv(&mut self) -> Option<AppResult<String>>;

    /// Close the connection. Idempotent.
    async fn close(&mut self) -> AppResult<()>;
}
