//! Fixed-interval reconnect scheduling with an attempt ceiling.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use dashlink_core::config::ChannelConfig;

use crate::metrics::ChannelMetrics;

use super::event::DriverEvent;
use super::timer::{TimerKind, TimerSlot};

/// What `schedule` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReconnectDecision {
    /// A retry was armed; `attempt` is 1-based.
    Scheduled { attempt: u32 },
    /// A retry is already pending; nothing new was armed.
    AlreadyPending,
    /// The ceiling was reached; no retry will ever be armed.
    Exhausted { attempts: u32 },
}

/// Reconnect timer plus the attempt counter.
#[derive(Debug)]
pub(crate) struct ReconnectScheduler {
    max_attempts: u32,
    interval: Duration,
    attempts: u32,
    slot: TimerSlot,
}

impl ReconnectScheduler {
    pub(crate) fn new(config: &ChannelConfig, metrics: Arc<ChannelMetrics>) -> Self {
        Self {
            max_attempts: config.max_reconnect_attempts,
            interval: config.reconnect_interval(),
            attempts: 0,
            slot: TimerSlot::new(TimerKind::Reconnect, metrics),
        }
    }

    /// Arm a retry unless one is pending or the ceiling is reached.
    ///
    /// The counter advances on every armed retry, whether or not the
    /// resulting attempt succeeds.
    pub(crate) fn schedule(
        &mut self,
        events: &mpsc::UnboundedSender<DriverEvent>,
    ) -> ReconnectDecision {
        if self.attempts >= self.max_attempts {
            return ReconnectDecision::Exhausted {
                attempts: self.attempts,
            };
        }

        if self.slot.is_armed() {
            return ReconnectDecision::AlreadyPending;
        }

        self.attempts += 1;
        self.slot
            .arm(self.interval, events, |seq| DriverEvent::ReconnectDue { seq });
        ReconnectDecision::Scheduled {
            attempt: self.attempts,
        }
    }

    /// Claim a fired retry; `false` means it is stale.
    pub(crate) fn take_fired(&mut self, seq: u64) -> bool {
        self.slot.take_fired(seq)
    }

    /// Cancel a pending retry.
    pub(crate) fn cancel(&mut self) -> bool {
        self.slot.cancel()
    }

    /// Forget previous attempts (successful open or explicit connect).
    pub(crate) fn reset(&mut self) {
        self.attempts = 0;
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.slot.is_armed()
    }
}
