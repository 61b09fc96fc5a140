//! Dashboard-facing wrapper that owns credentials and the endpoint.
//!
//! [`DashboardClient`] builds the endpoint URI from the current bearer
//! token and keeps a listener registry that outlives individual channel
//! managers, so listeners registered before login survive reconnecting
//! with a fresh token.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{info, warn};

use dashlink_core::config::{ChannelConfig, EndpointConfig};
use dashlink_core::AppResult;

use crate::connection::{ChannelManager, ChannelState, Liveness};
use crate::listener::{ListenerRegistry, MessageListener};
use crate::message::types::ApplicationMessage;
use crate::observer::{ChannelObserver, NoopObserver};
use crate::transport::{Connector, WsConnector};

/// Supplies the bearer credential for the endpoint.
pub trait CredentialSource: Send + Sync {
    /// Current token, `None` when signed out.
    fn bearer_token(&self) -> Option<String>;
}

/// A fixed credential.
#[derive(Debug, Clone, Default)]
pub struct StaticCredential {
    token: Option<String>,
}

impl StaticCredential {
    /// Wrap `token`; empty or blank tokens count as absent.
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }
}

impl CredentialSource for StaticCredential {
    fn bearer_token(&self) -> Option<String> {
        self.token.clone()
    }
}

/// Live-update channel for a signed-in dashboard session.
pub struct DashboardClient {
    endpoint: EndpointConfig,
    channel: ChannelConfig,
    credentials: Arc<dyn CredentialSource>,
    connector: Arc<dyn Connector>,
    observer: Arc<dyn ChannelObserver>,
    listeners: Arc<ListenerRegistry>,
    manager: Mutex<Option<ChannelManager>>,
}

impl DashboardClient {
    /// Client using the WebSocket transport and no observer.
    pub fn new(
        endpoint: EndpointConfig,
        channel: ChannelConfig,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            endpoint,
            channel,
            credentials,
            connector: Arc::new(WsConnector::new()),
            observer: Arc::new(NoopObserver),
            listeners: Arc::new(ListenerRegistry::new()),
            manager: Mutex::new(None),
        }
    }

    /// Use a different transport.
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Receive lifecycle notifications.
    pub fn with_observer(mut self, observer: Arc<dyn ChannelObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Connect with the current credential.
    ///
    /// Returns `Ok(false)` without touching the network when there is no
    /// token. Otherwise any previous channel is shut down first and a new
    /// one is started against the freshly built URI.
    pub async fn connect(&self) -> AppResult<bool> {
        let Some(token) = self.credentials.bearer_token() else {
            warn!("No bearer token available, not connecting");
            return Ok(false);
        };
        let url = self.endpoint.build_url(&token)?;

        if let Some(previous) = self.take_manager() {
            previous.shutdown().await?;
        }

        let manager = ChannelManager::builder(url)
            .config(self.channel.clone())
            .connector(self.connector.clone())
            .observer(self.observer.clone())
            .listeners(self.listeners.clone())
            .spawn()?;
        manager.connect().await?;

        info!(host = %self.endpoint.host, secure = self.endpoint.secure, "Dashboard channel started");
        *self.manager.lock().unwrap_or_else(|e| e.into_inner()) = Some(manager);
        Ok(true)
    }

    /// Stop the channel and clear every listener.
    pub async fn disconnect(&self) -> AppResult<()> {
        match self.take_manager() {
            Some(manager) => manager.disconnect().await,
            None => {
                self.listeners.clear();
                Ok(())
            }
        }
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

    /// Remove the listener for `id`.
    pub fn unregister(&self, id: &str) -> bool {
        self.listeners.unregister(id)
    }

    /// Send if connected; see [`ChannelManager::send`].
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> bool {
        match self.manager() {
            Some(manager) => manager.send(message),
            None => {
                warn!("Dashboard channel not started, message dropped");
                false
            }
        }
    }

    /// Whether the channel is open and healthy.
    pub fn is_connected(&self) -> bool {
        self.manager().is_some_and(|m| m.is_connected())
    }

    /// Current liveness, idle when no channel was started.
    pub fn liveness(&self) -> Liveness {
        self.manager().map(|m| m.liveness()).unwrap_or_default()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ChannelState {
        self.liveness().state
    }

    /// The running channel manager, if any.
    pub fn manager(&self) -> Option<ChannelManager> {
        self.manager
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// The registry shared by every manager this client starts.
    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    fn take_manager(&self) -> Option<ChannelManager> {
        self.manager.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}
