//! Channel manager instrumentation counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Counters and gauges updated by the channel driver.
#[derive(Debug, Default)]
pub struct ChannelMetrics {
    /// Transport open attempts started
    pub connect_attempts: AtomicU64,
    /// Successful opens
    pub opens: AtomicU64,
    /// Close events handled for the live connection
    pub closes: AtomicU64,
    /// Connections closed because the heartbeat timed out
    pub forced_closes: AtomicU64,
    /// Reconnects scheduled
    pub reconnects_scheduled: AtomicU64,
    /// Heartbeat probes sent
    pub probes_sent: AtomicU64,
    /// Heartbeat acknowledgments received
    pub acks_received: AtomicU64,
    /// Application messages fanned out
    pub messages_dispatched: AtomicU64,
    /// Inbound frames dropped as malformed
    pub malformed_frames: AtomicU64,
    /// Outbound messages discarded
    pub sends_dropped: AtomicU64,
    /// Listener invocations that failed
    pub listener_failures: AtomicU64,
    /// Reconnect timers currently armed
    pub reconnect_timers_pending: AtomicU64,
    /// Highest value `reconnect_timers_pending` ever reached
    pub reconnect_timers_peak: AtomicU64,
    /// Heartbeat-timeout timers currently armed
    pub heartbeat_timeouts_pending: AtomicU64,
    /// Highest value `heartbeat_timeouts_pending` ever reached
    pub heartbeat_timeouts_peak: AtomicU64,
}

impl ChannelMetrics {
    /// Create new zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Add `n` to a counter
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Increment a gauge and raise its peak.
    pub fn gauge_up(gauge: &AtomicU64, peak: &AtomicU64) {
        let now = gauge.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
    }

    /// Decrement a gauge, saturating at zero.
    pub fn gauge_down(gauge: &AtomicU64) {
        let _ = gauge.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1));
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            opens: self.opens.load(Ordering::Relaxed),
            closes: self.closes.load(Ordering::Relaxed),
            forced_closes: self.forced_closes.load(Ordering::Relaxed),
            reconnects_scheduled: self.reconnects_scheduled.load(Ordering::Relaxed),
            probes_sent: self.probes_sent.load(Ordering::Relaxed),
            acks_received: self.acks_received.load(Ordering::Relaxed),
            messages_dispatched: self.messages_dispatched.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            sends_dropped: self.sends_dropped.load(Ordering::Relaxed),
            listener_failures: self.listener_failures.load(Ordering::Relaxed),
            reconnect_timers_pending: self.reconnect_timers_pending.load(Ordering::SeqCst),
            reconnect_timers_peak: self.reconnect_timers_peak.load(Ordering::SeqCst),
            heartbeat_timeouts_pending: self.heartbeat_timeouts_pending.load(Ordering::SeqCst),
            heartbeat_timeouts_peak: self.heartbeat_timeouts_peak.load(Ordering::SeqCst),
        }
    }
}

/// Serializable metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Transport open attempts started
    pub connect_attempts: u64,
    /// Successful opens
    pub opens: u64,
    /// Close events handled
    pub closes: u64,
    /// Heartbeat-forced closes
    pub forced_closes: u64,
    /// Reconnects scheduled
    pub reconnects_scheduled: u64,
    /// Probes sent
    pub probes_sent: u64,
    /// Acks received
    pub acks_received: u64,
    /// Application messages dispatched
    pub messages_dispatched: u64,
    /// Malformed frames dropped
    pub malformed_frames: u64,
    /// Sends discarded
    pub sends_dropped: u64,
    /// Listener failures
    pub listener_failures: u64,
    /// Reconnect timers armed now
    pub reconnect_timers_pending: u64,
    /// Peak concurrently armed reconnect timers
    pub reconnect_timers_peak: u64,
    /// Heartbeat-timeout timers armed now
    pub heartbeat_timeouts_pending: u64,
    /// Peak concurrently armed heartbeat-timeout timers
    pub heartbeat_timeouts_peak: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauge_tracks_peak() {
        let metrics = ChannelMetrics::new();
        ChannelMetrics::gauge_up(&metrics.reconnect_timers_pending, &metrics.reconnect_timers_peak);
        ChannelMetrics::gauge_down(&metrics.reconnect_timers_pending);
        ChannelMetrics::gauge_down(&metrics.reconnect_timers_pending);
        ChannelMetrics::gauge_up(&metrics.reconnect_timers_pending, &metrics.reconnect_timers_peak);

        let snap = metrics.snapshot();
        assert_eq!(snap.reconnect_timers_pending, 1);
        assert_eq!(snap.reconnect_timers_peak, 1);
    }
}
