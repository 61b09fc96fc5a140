//! In-process transport for single-process wiring and tests.
//!
//! Each successful [`MemoryConnector::connect`] hands the server side of
//! the connection out as a [`MemoryPeer`], which can push frames, raise
//! transport errors, close, and read what the client sent.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use dashlink_core::AppResult;
use dashlink_core::error::AppError;

use super::{Connector, Transport};

/// Events travelling from the server side to the client side.
#[derive(Debug)]
enum PeerEvent {
    Frame(String),
    Error(String),
    Close,
}

#[derive(Debug, Default)]
struct ConnectorState {
    refusing: AtomicBool,
    attempts: AtomicUsize,
    open: AtomicUsize,
}

/// Connector producing in-memory connections.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    state: Arc<ConnectorState>,
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

impl MemoryConnector {
    /// Create a connector and the receiver on which accepted peers arrive.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        (
            Self {
                state: Arc::new(ConnectorState::default()),
                peers,
            },
            rx,
        )
    }

    /// Refuse (or accept again) subsequent connection attempts.
    pub fn set_refusing(&self, refusing: bool) {
        self.state.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Number of `connect` calls seen, refused ones included.
    pub fn attempts(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }

    /// Number of client-side transports not yet closed or dropped.
    pub fn open_connections(&self) -> usize {
        self.state.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &str) -> AppResult<Box<dyn Transport>> {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);

        if self.state.refusing.load(Ordering::SeqCst) {
            return Err(AppError::transport(format!("Connection refused: {url}")));
        }

        let (to_client, from_peer) = mpsc::unbounded_channel();
        let (to_peer, from_client) = mpsc::unbounded_channel();
        let client_closed = Arc::new(AtomicBool::new(false));

        let peer = MemoryPeer {
            url: url.to_string(),
            to_client,
            from_client,
            client_closed: client_closed.clone(),
        };

        self.peers
            .send(peer)
            .map_err(|_| AppError::service_unavailable("Memory listener is gone"))?;

        self.state.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryTransport {
            inbound: from_peer,
            outbound: Some(to_peer),
            closed: client_closed,
            state: self.state.clone(),
        }))
    }
}

/// Client side of an in-memory connection.
#[derive(Debug)]
pub struct MemoryTransport {
    inbound: mpsc::UnboundedReceiver<PeerEvent>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    closed: Arc<AtomicBool>,
    state: Arc<ConnectorState>,
}

impl MemoryTransport {
    fn mark_closed(&mut self) {
        self.outbound = None;
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, frame: String) -> AppResult<()> {
        match &self.outbound {
            Some(tx) => tx
                .send(frame)
                .map_err(|_| AppError::transport("Peer has gone away")),
            None => Err(AppError::transport("Transport is closed")),
        }
    }

    async fn recv(&mut self) -> Option<AppResult<String>> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        match self.inbound.recv().await {
            Some(PeerEvent::Frame(text)) => Some(Ok(text)),
            Some(PeerEvent::Error(message)) => Some(Err(AppError::transport(message))),
            Some(PeerEvent::Close) | None => None,
        }
    }

    async fn close(&mut self) -> AppResult<()> {
        self.mark_closed();
        Ok(())
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.mark_closed();
    }
}

/// Server side of an in-memory connection.
#[derive(Debug)]
pub struct MemoryPeer {
    url: String,
    to_client: mpsc::UnboundedSender<PeerEvent>,
    from_client: mpsc::UnboundedReceiver<String>,
    client_closed: Arc<AtomicBool>,
}

impl MemoryPeer {
    /// URI the client connected to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Push a raw text frame to the client.
    pub fn push(&self, text: impl Into<String>) -> bool {
        self.to_client.send(PeerEvent::Frame(text.into())).is_ok()
    }

    /// Push a JSON frame to the client.
    pub fn push_json(&self, value: &serde_json::Value) -> bool {
        self.push(value.to_string())
    }

    /// Raise a transport error on the client side.
    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.to_client.send(PeerEvent::Error(message.into())).is_ok()
    }

    /// Close the connection from the server side.
    pub fn close(&self) -> bool {
        self.to_client.send(PeerEvent::Close).is_ok()
    }

    /// Next frame sent by the client; `None` once the client closed.
    pub async fn next_frame(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Drain frames already sent by the client without waiting.
    pub fn drain_frames(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.from_client.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Whether the client side has closed or dropped its transport.
    pub fn is_client_closed(&self) -> bool {
        self.client_closed.load(Ordering::SeqCst)
    }
}
