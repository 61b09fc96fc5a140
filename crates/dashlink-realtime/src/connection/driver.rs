//! The task that owns the channel state machine.
//!
//! Commands from [`ChannelManager`](super::manager::ChannelManager) and
//! transport/timer events are handled one at a time on this task, so no
//! transition ever races another.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use dashlink_core::config::ChannelConfig;
use dashlink_core::AppError;

use crate::listener::ListenerRegistry;
use crate::message::serializer::{parse_inbound, serialize_outbound};
use crate::message::types::{ApplicationMessage, ControlMessage, InboundFrame};
use crate::metrics::ChannelMetrics;
use crate::observer::ChannelObserver;
use crate::transport::Connector;
use crate::transport::websocket::redact;

use super::event::DriverEvent;
use super::handle::{ConnectionHandle, run_connection};
use super::heartbeat::HeartbeatMonitor;
use super::reconnect::{ReconnectDecision, ReconnectScheduler};
use super::state::{ChannelState, Liveness};

/// Requests from the public handle. Each is acknowledged once applied.
#[derive(Debug)]
pub(crate) enum Command {
    Connect { done: oneshot::Sender<()> },
    Disconnect { done: oneshot::Sender<()> },
    /// Like `Disconnect` but leaves the listener registry intact.
    Shutdown { done: oneshot::Sender<()> },
}

/// State readable outside the driver task.
#[derive(Debug)]
pub(crate) struct Shared {
    /// Handle of the open connection, `None` unless open.
    pub(crate) current: Mutex<Option<Arc<ConnectionHandle>>>,
    /// Published on every transition.
    pub(crate) liveness: watch::Sender<Liveness>,
}

impl Shared {
    pub(crate) fn new() -> Self {
        let (liveness, _) = watch::channel(Liveness::default());
        Self {
            current: Mutex::new(None),
            liveness,
        }
    }

    pub(crate) fn current(&self) -> Option<Arc<ConnectionHandle>> {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_current(&self, handle: Option<Arc<ConnectionHandle>>) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = handle;
    }
}

/// Collaborators the driver is built from.
pub(crate) struct DriverParts {
    pub(crate) url: String,
    pub(crate) config: ChannelConfig,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) observer: Arc<dyn ChannelObserver>,
    pub(crate) listeners: Arc<ListenerRegistry>,
    pub(crate) metrics: Arc<ChannelMetrics>,
    pub(crate) shared: Arc<Shared>,
}

pub(crate) struct Driver {
    url: String,
    config: ChannelConfig,
    connector: Arc<dyn Connector>,
    observer: Arc<dyn ChannelObserver>,
    listeners: Arc<ListenerRegistry>,
    metrics: Arc<ChannelMetrics>,
    shared: Arc<Shared>,
    commands: mpsc::Receiver<Command>,
    events_tx: mpsc::UnboundedSender<DriverEvent>,
    events_rx: mpsc::UnboundedReceiver<DriverEvent>,
    state: ChannelState,
    generation: u64,
    handle: Option<Arc<ConnectionHandle>>,
    heartbeat: HeartbeatMonitor,
    reconnect: ReconnectScheduler,
}

impl Driver {
    pub(crate) fn new(parts: DriverParts, commands: mpsc::Receiver<Command>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let heartbeat = HeartbeatMonitor::new(&parts.config, parts.metrics.clone());
        let reconnect = ReconnectScheduler::new(&parts.config, parts.metrics.clone());

        Self {
            url: parts.url,
            config: parts.config,
            connector: parts.connector,
            observer: parts.observer,
            listeners: parts.listeners,
            metrics: parts.metrics,
            shared: parts.shared,
            commands,
            events_tx,
            events_rx,
            state: ChannelState::Idle,
            generation: 0,
            handle: None,
            heartbeat,
            reconnect,
        }
    }

    /// Run until every `ChannelManager` clone is dropped.
    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event),
            }
        }

        self.shutdown();
        debug!(url = %redact(&self.url), "Channel driver stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { done } => {
                self.reconnect.cancel();
                self.reconnect.reset();
                if self.handle.is_some() {
                    debug!("Replacing existing connection");
                    self.release_connection();
                }
                self.open_connection();
                let _ = done.send(());
            }
            Command::Disconnect { done } => {
                self.teardown();
                info!(url = %redact(&self.url), "Channel disconnected");
                let _ = done.send(());
            }
            Command::Shutdown { done } => {
                self.shutdown();
                debug!(url = %redact(&self.url), "Channel shut down");
                let _ = done.send(());
            }
        }
    }

    fn handle_event(&mut self, event: DriverEvent) {
        match event {
            DriverEvent::Opened { generation } => self.on_opened(generation),
            DriverEvent::Frame { generation, text } => self.on_frame(generation, &text),
            DriverEvent::TransportError { generation, error } => {
                self.on_transport_error(generation, &error)
            }
            DriverEvent::Closed { generation } => self.on_closed(generation),
            DriverEvent::HeartbeatTick { generation } => self.on_heartbeat_tick(generation),
            DriverEvent::HeartbeatTimeout { seq } => self.on_heartbeat_timeout(seq),
            DriverEvent::ReconnectDue { seq } => self.on_reconnect_due(seq),
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|h| h.generation == generation)
    }

    /// Start a transport open for a fresh generation.
    fn open_connection(&mut self) {
        self.generation += 1;
        let (tx, rx) = mpsc::channel(self.config.outbound_buffer_size);
        let handle = Arc::new(ConnectionHandle::new(self.generation, tx));

        tokio::spawn(run_connection(
            self.connector.clone(),
            self.url.clone(),
            handle.clone(),
            rx,
            self.events_tx.clone(),
            self.config.heartbeat_timeout(),
        ));

        ChannelMetrics::inc(&self.metrics.connect_attempts);
        debug!(
            conn_id = %handle.id,
            generation = self.generation,
            url = %redact(&self.url),
            "Connecting"
        );

        self.handle = Some(handle);
        self.state = ChannelState::Connecting;
        self.publish();
    }

    /// Close and forget the live handle without triggering a reconnect.
    fn release_connection(&mut self) {
        self.heartbeat.stop();
        self.shared.set_current(None);
        if let Some(handle) = self.handle.take() {
            handle.close();
        }
    }

    /// Cancel every timer, drop the handle, clear listeners, go idle.
    fn teardown(&mut self) {
        self.shutdown();
        self.listeners.clear();
    }

    /// Cancel every timer and drop the handle, keeping listeners.
    fn shutdown(&mut self) {
        self.reconnect.cancel();
        self.reconnect.reset();
        self.release_connection();
        self.state = ChannelState::Idle;
        self.publish();

        debug_assert!(!self.reconnect.is_pending());
        debug_assert!(!self.heartbeat.is_running());
        debug_assert!(!self.heartbeat.deadline_armed());
    }

    fn on_opened(&mut self, generation: u64) {
        let Some(handle) = self.handle.clone().filter(|h| h.generation == generation) else {
            debug!(generation, "Ignoring open of a replaced connection");
            return;
        };

        self.reconnect.reset();
        self.heartbeat.start(generation, &self.events_tx);
        self.shared.set_current(Some(handle.clone()));
        self.state = ChannelState::Open;
        ChannelMetrics::inc(&self.metrics.opens);

        info!(conn_id = %handle.id, url = %redact(&self.url), "Channel connected");
        self.publish();
        self.observer.on_open();
    }

    fn on_frame(&mut self, generation: u64, text: &str) {
        if !self.is_current(generation) {
            return;
        }

        match parse_inbound(text) {
            Ok(InboundFrame::HeartbeatAck { note }) => {
                let rtt = self.heartbeat.record_ack();
                ChannelMetrics::inc(&self.metrics.acks_received);
                debug!(rtt = ?rtt, note = note.as_deref().unwrap_or("ok"), "Heartbeat acknowledged");
                self.publish();
            }
            Ok(InboundFrame::Application(message)) => self.dispatch(&message),
            Err(e) => {
                ChannelMetrics::inc(&self.metrics.malformed_frames);
                warn!(error = %e, len = text.len(), "Dropping malformed frame");
            }
        }
    }

    fn dispatch(&self, message: &ApplicationMessage) {
        self.observer.on_message(message);
        let report = self.listeners.dispatch(message);
        ChannelMetrics::inc(&self.metrics.messages_dispatched);
        ChannelMetrics::add(&self.metrics.listener_failures, report.failed as u64);
        debug!(
            kind = %message.kind,
            delivered = report.delivered,
            failed = report.failed,
            "Dispatched message"
        );
    }

    fn on_transport_error(&mut self, generation: u64, error: &AppError) {
        if !self.is_current(generation) {
            return;
        }
        warn!(error = %error, state = %self.state, "Transport error");
        self.observer.on_error(error);
    }

    fn on_closed(&mut self, generation: u64) {
        if !self.is_current(generation) {
            debug!(generation, "Ignoring close of a replaced connection");
            return;
        }

        let was = self.state;
        self.heartbeat.stop();
        self.shared.set_current(None);
        self.handle = None;
        self.state = ChannelState::Idle;
        ChannelMetrics::inc(&self.metrics.closes);

        info!(previous = %was, "Channel closed");
        self.publish();
        self.observer.on_close();
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        match self.reconnect.schedule(&self.events_tx) {
            ReconnectDecision::Scheduled { attempt } => {
                let max = self.reconnect.max_attempts();
                ChannelMetrics::inc(&self.metrics.reconnects_scheduled);
                info!(
                    attempt,
                    max_attempts = max,
                    delay_ms = self.config.reconnect_interval_ms,
                    "Reconnect scheduled"
                );
                self.state = ChannelState::Reconnecting { attempt };
                self.publish();
                self.observer.on_reconnect_scheduled(attempt, max);
            }
            ReconnectDecision::AlreadyPending => {
                debug!("Reconnect already pending");
            }
            ReconnectDecision::Exhausted { attempts } => {
                error!(attempts, url = %redact(&self.url), "Reconnect attempts exhausted");
                self.state = ChannelState::Exhausted;
                self.publish();
                self.observer.on_exhausted(attempts);
            }
        }
    }

    fn on_heartbeat_tick(&mut self, generation: u64) {
        if !self.is_current(generation) || self.state != ChannelState::Open {
            return;
        }
        let Some(handle) = self.handle.clone() else {
            return;
        };

        match serialize_outbound(&ControlMessage::heartbeat_now()) {
            Ok(frame) => {
                if handle.send(frame) {
                    ChannelMetrics::inc(&self.metrics.probes_sent);
                } else {
                    warn!(conn_id = %handle.id, "Heartbeat probe could not be queued");
                }
            }
            Err(e) => error!(error = %e, "Failed to encode heartbeat probe"),
        }

        self.heartbeat.probe_sent(&self.events_tx);
    }

    fn on_heartbeat_timeout(&mut self, seq: u64) {
        if !self.heartbeat.take_deadline(seq) {
            return;
        }
        if self.heartbeat.acked_since_probe() {
            return;
        }
        let Some(handle) = self.handle.clone() else {
            return;
        };

        warn!(
            conn_id = %handle.id,
            timeout_ms = self.config.heartbeat_timeout_ms,
            "Heartbeat timed out, closing connection"
        );
        ChannelMetrics::inc(&self.metrics.forced_closes);
        self.state = ChannelState::Closing;
        self.publish();
        handle.close();
    }

    fn on_reconnect_due(&mut self, seq: u64) {
        if !self.reconnect.take_fired(seq) {
            return;
        }
        info!(
            attempt = self.reconnect.attempts(),
            max_attempts = self.reconnect.max_attempts(),
            "Reconnecting"
        );
        self.open_connection();
    }

    fn publish(&self) {
        let liveness = Liveness {
            state: self.state,
            connected: self.state == ChannelState::Open,
            reconnect_attempts: self.reconnect.attempts(),
            last_heartbeat_ack_at: self.heartbeat.last_ack_at(),
        };
        self.shared.liveness.send_if_modified(|current| {
            if *current == liveness {
                false
            } else {
                *current = liveness;
                true
            }
        });
    }
}
