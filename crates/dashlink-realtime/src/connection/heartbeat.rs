//! Application-level heartbeat: periodic probes plus an ack deadline.
//!
//! Transport "open" is not proof that the peer is alive. While the channel
//! is open a probe goes out every `heartbeat_interval`; if no ack is recorded
//! within `heartbeat_timeout` of a probe, the connection is presumed dead.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use dashlink_core::config::ChannelConfig;

use crate::metrics::ChannelMetrics;

use super::event::DriverEvent;
use super::timer::{TimerKind, TimerSlot};

/// Heartbeat state for the live connection.
#[derive(Debug)]
pub(crate) struct HeartbeatMonitor {
    interval: Duration,
    timeout: Duration,
    ticker: Option<CancellationToken>,
    deadline: TimerSlot,
    /// Send time of the probe still awaiting its ack.
    outstanding_probe: Option<Instant>,
    last_ack_at: Option<DateTime<Utc>>,
}

impl HeartbeatMonitor {
    pub(crate) fn new(config: &ChannelConfig, metrics: Arc<ChannelMetrics>) -> Self {
        Self {
            interval: config.heartbeat_interval(),
            timeout: config.heartbeat_timeout(),
            ticker: None,
            deadline: TimerSlot::new(TimerKind::HeartbeatTimeout, metrics),
            outstanding_probe: None,
            last_ack_at: None,
        }
    }

    /// Start the probe cycle for `generation`.
    ///
    /// Seeds the last-ack time with now so the first deadline cannot trip
    /// before a full round-trip has had a chance to complete.
    pub(crate) fn start(&mut self, generation: u64, events: &mpsc::UnboundedSender<DriverEvent>) {
        self.stop();
        self.record_ack();

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let tx = events.clone();
        let period = self.interval;

        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        if tx.send(DriverEvent::HeartbeatTick { generation }).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        self.ticker = Some(token);
    }

    /// Stop probing, drop any pending deadline, and forget the last ack.
    pub(crate) fn stop(&mut self) {
        if let Some(token) = self.ticker.take() {
            token.cancel();
        }
        self.deadline.cancel();
        self.outstanding_probe = None;
        self.last_ack_at = None;
    }

    /// A probe just went out: arm the ack deadline, replacing any prior one.
    pub(crate) fn probe_sent(&mut self, events: &mpsc::UnboundedSender<DriverEvent>) {
        self.outstanding_probe = Some(Instant::now());
        self.deadline
            .arm(self.timeout, events, |seq| DriverEvent::HeartbeatTimeout { seq });
    }

    /// An acknowledgment arrived: record it and clear the deadline.
    ///
    /// Returns the round-trip time when a probe was outstanding.
    pub(crate) fn record_ack(&mut self) -> Option<Duration> {
        self.last_ack_at = Some(Utc::now());
        self.deadline.cancel();
        self.outstanding_probe.take().map(|sent| sent.elapsed())
    }

    /// Claim a deadline event; `false` means it is stale.
    pub(crate) fn take_deadline(&mut self, seq: u64) -> bool {
        self.deadline.take_fired(seq)
    }

    /// Whether an ack was recorded after the latest probe.
    ///
    /// Events are handled in arrival order, so an ack handled after the
    /// probe went out necessarily arrived at or after its send time.
    pub(crate) fn acked_since_probe(&self) -> bool {
        self.outstanding_probe.is_none()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    pub(crate) fn deadline_armed(&self) -> bool {
        self.deadline.is_armed()
    }

    pub(crate) fn last_ack_at(&self) -> Option<DateTime<Utc>> {
        self.last_ack_at
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        if let Some(token) = self.ticker.take() {
            token.cancel();
        }
    }
}
