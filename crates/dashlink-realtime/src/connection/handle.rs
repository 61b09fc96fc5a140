//! Handle to the single live transport connection and its I/O pump.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::transport::Connector;

use super::event::DriverEvent;

/// Unique connection identifier
pub type ConnectionId = Uuid;

/// A handle to one transport connection.
///
/// Holds the sender for outbound frames plus the token that tears the
/// connection down. Exactly one handle is live per manager.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Unique connection ID
    pub id: ConnectionId,
    /// Manager-local sequence number of this connection
    pub generation: u64,
    /// When the connection was requested
    pub created_at: DateTime<Utc>,
    sender: mpsc::Sender<String>,
    shutdown: CancellationToken,
    alive: AtomicBool,
}

impl ConnectionHandle {
    pub(crate) fn new(generation: u64, sender: mpsc::Sender<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            generation,
            created_at: Utc::now(),
            sender,
            shutdown: CancellationToken::new(),
            alive: AtomicBool::new(true),
        }
    }

    /// Queue a text frame for transmission.
    pub fn send(&self, frame: String) -> bool {
        if !self.is_alive() {
            return false;
        }
        match self.sender.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(conn_id = %self.id, "Outbound buffer full, dropping frame");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.mark_dead();
                false
            }
        }
    }

    /// Check if connection is alive
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Mark connection as dead
    pub fn mark_dead(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Tear the transport down. The pump reports `Closed` afterwards.
    pub fn close(&self) {
        self.mark_dead();
        self.shutdown.cancel();
    }

    /// Whether `close` has been called.
    pub fn is_closing(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Open the transport and shuttle frames until either side closes.
///
/// Emits `Opened` on success, `Frame`/`TransportError` while running, and
/// exactly one `Closed` at the end, including when the open itself fails.
/// Neither a stalled write nor a stalled close can hold `Closed` back for
/// longer than `close_timeout` after [`ConnectionHandle::close`].
pub(crate) async fn run_connection(
    connector: Arc<dyn Connector>,
    url: String,
    handle: Arc<ConnectionHandle>,
    mut outbound: mpsc::Receiver<String>,
    events: mpsc::UnboundedSender<DriverEvent>,
    close_timeout: Duration,
) {
    let generation = handle.generation;

    let connected = tokio::select! {
        _ = handle.shutdown.cancelled() => None,
        result = connector.connect(&url) => match result {
            Ok(transport) => Some(transport),
            Err(error) => {
                let _ = events.send(DriverEvent::TransportError { generation, error });
                None
            }
        },
    };

    let Some(mut transport) = connected else {
        handle.mark_dead();
        let _ = events.send(DriverEvent::Closed { generation });
        return;
    };

    if !handle.is_closing() {
        let _ = events.send(DriverEvent::Opened { generation });

        loop {
            tokio::select! {
                _ = handle.shutdown.cancelled() => break,
                frame = outbound.recv() => match frame {
                    Some(frame) => {
                        // A peer that stops reading can stall a write forever.
                        let sent = tokio::select! {
                            _ = handle.shutdown.cancelled() => break,
                            sent = transport.send(frame) => sent,
                        };
                        if let Err(error) = sent {
                            let _ = events.send(DriverEvent::TransportError { generation, error });
                            break;
                        }
                    }
                    None => break,
                },
                inbound = transport.recv() => match inbound {
                    Some(Ok(text)) => {
                        let _ = events.send(DriverEvent::Frame { generation, text });
                    }
                    Some(Err(error)) => {
                        let _ = events.send(DriverEvent::TransportError { generation, error });
                        break;
                    }
                    None => break,
                },
            }
        }
    }

    match tokio::time::timeout(close_timeout, transport.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            debug!(conn_id = %handle.id, error = %e, "Transport close reported an error");
        }
        Err(_) => {
            warn!(
                conn_id = %handle.id,
                timeout_ms = close_timeout.as_millis() as u64,
                "Transport close timed out, abandoning connection"
            );
        }
    }
    handle.mark_dead();
    let _ = events.send(DriverEvent::Closed { generation });
    debug!(conn_id = %handle.id, generation, "Connection pump ended");
}
