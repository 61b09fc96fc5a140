//! Public handle to one channel: connect, disconnect, send, listen.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use dashlink_core::config::ChannelConfig;
use dashlink_core::{AppError, AppResult};
use validator::Validate;

use crate::listener::{ListenerRegistry, MessageListener};
use crate::message::serializer::serialize_outbound;
use crate::message::types::ApplicationMessage;
use crate::metrics::{ChannelMetrics, MetricsSnapshot};
use crate::observer::{ChannelObserver, NoopObserver};
use crate::transport::{Connector, WsConnector};
use crate::transport::websocket::redact;

use super::driver::{Command, Driver, DriverParts, Shared};
use super::state::{ChannelState, Liveness};

const COMMAND_BUFFER: usize = 32;

/// Manages the single live connection to one endpoint.
///
/// Cheap to clone; every clone drives the same channel. The background
/// driver stops, closing any connection, once the last clone is dropped.
#[derive(Debug, Clone)]
pub struct ChannelManager {
    url: Arc<str>,
    commands: mpsc::Sender<Command>,
    shared: Arc<Shared>,
    listeners: Arc<ListenerRegistry>,
    metrics: Arc<ChannelMetrics>,
}

impl ChannelManager {
    /// Start building a manager for `url`.
    pub fn builder(url: impl Into<String>) -> ChannelManagerBuilder {
        ChannelManagerBuilder {
            url: url.into(),
            config: ChannelConfig::default(),
            connector: None,
            observer: None,
            listeners: None,
        }
    }

    /// Open a connection, replacing any existing one.
    ///
    /// Also resets the attempt counter and cancels a pending reconnect, so
    /// this is how a channel leaves `Exhausted`. Returns once the open has
    /// been started; watch [`subscribe`](Self::subscribe) for the outcome.
    pub async fn connect(&self) -> AppResult<()> {
        self.request(|done| Command::Connect { done }).await
    }

    /// Close the connection, cancel every timer, and clear all listeners.
    ///
    /// The only way to stop automatic reconnection. Returns once the driver
    /// has applied it.
    pub async fn disconnect(&self) -> AppResult<()> {
        self.request(|done| Command::Disconnect { done }).await
    }

    /// Like [`disconnect`](Self::disconnect) but keeps registered listeners.
    pub async fn shutdown(&self) -> AppResult<()> {
        self.request(|done| Command::Shutdown { done }).await
    }

    async fn request(&self, make: impl FnOnce(oneshot::Sender<()>) -> Command) -> AppResult<()> {
        let (done, applied) = oneshot::channel();
        self.commands
            .send(make(done))
            .await
            .map_err(|_| AppError::service_unavailable("Channel driver has stopped"))?;
        applied
            .await
            .map_err(|_| AppError::service_unavailable("Channel driver dropped the request"))
    }

    /// Register or replace the listener for `id`.
    pub fn register(&self, id: impl Into<String>, listener: Arc<dyn MessageListener>) {
        self.listeners.register(id, listener);
    }

    /// Register a closure as the listener for `id`.
    pub fn register_fn<F>(&self, id: impl Into<String>, f: F)
    where
        F: Fn(&ApplicationMessage) -> AppResult<()> + Send + Sync + 'static,
    {
        self.listeners.register(id, Arc::new(f));
    }

    /// Remove the listener for `id`. No-op if absent.
    pub fn unregister(&self, id: &str) -> bool {
        self.listeners.unregister(id)
    }

    /// Serialize and transmit `message` if the channel is connected.
    ///
    /// Never queues: while disconnected the message is dropped with a
    /// warning and `false` is returned.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> bool {
        let handle = match self.shared.current() {
            Some(handle) if self.is_connected() => handle,
            _ => {
                ChannelMetrics::inc(&self.metrics.sends_dropped);
                warn!(url = %redact(&self.url), "Channel not connected, message dropped");
                return false;
            }
        };

        let frame = match serialize_outbound(message) {
            Ok(frame) => frame,
            Err(e) => {
                ChannelMetrics::inc(&self.metrics.sends_dropped);
                warn!(error = %e, "Failed to serialize outbound message");
                return false;
            }
        };

        if handle.send(frame) {
            debug!(conn_id = %handle.id, "Message queued");
            true
        } else {
            ChannelMetrics::inc(&self.metrics.sends_dropped);
            false
        }
    }

    /// Latest liveness snapshot.
    pub fn liveness(&self) -> Liveness {
        self.shared.liveness.borrow().clone()
    }

    /// Whether the channel is open and its heartbeat healthy.
    pub fn is_connected(&self) -> bool {
        self.shared.liveness.borrow().connected
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ChannelState {
        self.shared.liveness.borrow().state
    }

    /// Reconnect attempts since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.liveness.borrow().reconnect_attempts
    }

    /// Receiver that sees every liveness transition.
    pub fn subscribe(&self) -> watch::Receiver<Liveness> {
        self.shared.liveness.subscribe()
    }

    /// Instrumentation snapshot.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// The registry listeners are dispatched from.
    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    /// Endpoint URI, credential included.
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Builder for [`ChannelManager`].
pub struct ChannelManagerBuilder {
    url: String,
    config: ChannelConfig,
    connector: Option<Arc<dyn Connector>>,
    observer: Option<Arc<dyn ChannelObserver>>,
    listeners: Option<Arc<ListenerRegistry>>,
}

impl ChannelManagerBuilder {
    /// Timing and buffer settings.
    pub fn config(mut self, config: ChannelConfig) -> Self {
        self.config = config;
        self
    }

    /// Transport to use. Defaults to [`WsConnector`].
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Lifecycle observer. Defaults to [`NoopObserver`].
    pub fn observer(mut self, observer: Arc<dyn ChannelObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Share an existing listener registry instead of creating one.
    pub fn listeners(mut self, listeners: Arc<ListenerRegistry>) -> Self {
        self.listeners = Some(listeners);
        self
    }

    /// Validate the settings and spawn the driver task.
    ///
    /// Must be called within a tokio runtime. The channel starts `Idle`.
    pub fn spawn(self) -> AppResult<ChannelManager> {
        if self.url.trim().is_empty() {
            return Err(AppError::validation("Channel URL must not be empty"));
        }
        self.config.validate()?;

        let (commands, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let shared = Arc::new(Shared::new());
        let listeners = self
            .listeners
            .unwrap_or_else(|| Arc::new(ListenerRegistry::new()));
        let metrics = Arc::new(ChannelMetrics::new());

        let driver = Driver::new(
            DriverParts {
                url: self.url.clone(),
                config: self.config,
                connector: self.connector.unwrap_or_else(|| Arc::new(WsConnector::new())),
                observer: self.observer.unwrap_or_else(|| Arc::new(NoopObserver)),
                listeners: listeners.clone(),
                metrics: metrics.clone(),
                shared: shared.clone(),
            },
            commands_rx,
        );
        tokio::spawn(driver.run());

        debug!(url = %redact(&self.url), "Channel manager started");

        Ok(ChannelManager {
            url: Arc::from(self.url),
            commands,
            shared,
            listeners,
            metrics,
        })
    }
}
