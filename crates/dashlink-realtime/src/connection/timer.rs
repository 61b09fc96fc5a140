//! Single-occupancy cancellable one-shot timers.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::metrics::ChannelMetrics;

use super::event::DriverEvent;

/// Which gauge a slot reports into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    Reconnect,
    HeartbeatTimeout,
}

/// Holds at most one pending timer.
///
/// Arming cancels whatever was pending. A fired timer enqueues its event
/// tagged with the arming sequence; [`TimerSlot::take_fired`] accepts it only
/// if that arming is still the current one, so an event queued just before
/// a cancel is ignored.
#[derive(Debug)]
pub(crate) struct TimerSlot {
    kind: TimerKind,
    seq: u64,
    armed: Option<CancellationToken>,
    metrics: Arc<ChannelMetrics>,
}

impl TimerSlot {
    pub(crate) fn new(kind: TimerKind, metrics: Arc<ChannelMetrics>) -> Self {
        Self {
            kind,
            seq: 0,
            armed: None,
            metrics,
        }
    }

    fn gauges(&self) -> (&AtomicU64, &AtomicU64) {
        match self.kind {
            TimerKind::Reconnect => (
                &self.metrics.reconnect_timers_pending,
                &self.metrics.reconnect_timers_peak,
            ),
            TimerKind::HeartbeatTimeout => (
                &self.metrics.heartbeat_timeouts_pending,
                &self.metrics.heartbeat_timeouts_peak,
            ),
        }
    }

    /// Arm the slot; `make_event` builds the event from the arming sequence.
    pub(crate) fn arm<F>(
        &mut self,
        delay: Duration,
        events: &mpsc::UnboundedSender<DriverEvent>,
        make_event: F,
    ) -> u64
    where
        F: FnOnce(u64) -> DriverEvent,
    {
        self.cancel();

        self.seq += 1;
        let seq = self.seq;
        let event = make_event(seq);
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let tx = events.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(event);
                }
            }
        });

        self.armed = Some(token);
        let (pending, peak) = self.gauges();
        ChannelMetrics::gauge_up(pending, peak);
        seq
    }

    /// Cancel the pending timer, if any. Returns whether one was pending.
    pub(crate) fn cancel(&mut self) -> bool {
        match self.armed.take() {
            Some(token) => {
                token.cancel();
                ChannelMetrics::gauge_down(self.gauges().0);
                true
            }
            None => false,
        }
    }

    /// Claim a fired event. `false` means it is stale and must be ignored.
    pub(crate) fn take_fired(&mut self, seq: u64) -> bool {
        if self.armed.is_some() && seq == self.seq {
            self.armed = None;
            ChannelMetrics::gauge_down(self.gauges().0);
            true
        } else {
            false
        }
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.armed.is_some()
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}
