//! Channel manager configuration: reconnect policy and heartbeat timing.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Reconnect and heartbeat tuning for one channel manager.
///
/// Immutable for the lifetime of a manager. Backoff is a fixed interval:
/// every retry waits exactly `reconnect_interval_ms`.
#[derive(Debug, Clone, PartialEq, Eq, Validate, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Scheduled retries allowed before the manager gives up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Delay before each reconnect attempt, in milliseconds.
    #[serde(default = "default_reconnect_interval")]
    #[validate(range(min = 1))]
    pub reconnect_interval_ms: u64,
    /// Interval between heartbeat probes, in milliseconds.
    #[serde(default = "default_heartbeat_interval")]
    #[validate(range(min = 1))]
    pub heartbeat_interval_ms: u64,
    /// How long to wait for a heartbeat acknowledgment, in milliseconds.
    #[serde(default = "default_heartbeat_timeout")]
    #[validate(range(min = 1))]
    pub heartbeat_timeout_ms: u64,
    /// Capacity of the per-connection outbound frame buffer.
    #[serde(default = "default_outbound_buffer")]
    #[validate(range(min = 1))]
    pub outbound_buffer_size: usize,
}

impl ChannelConfig {
    /// Fixed reconnect delay.
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    /// Heartbeat probe period.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Heartbeat acknowledgment deadline.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_interval_ms: default_reconnect_interval(),
            heartbeat_interval_ms: default_heartbeat_interval(),
            heartbeat_timeout_ms: default_heartbeat_timeout(),
            outbound_buffer_size: default_outbound_buffer(),
        }
    }
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_reconnect_interval() -> u64 {
    5_000
}

fn default_heartbeat_interval() -> u64 {
    60_000
}

fn default_heartbeat_timeout() -> u64 {
    10_000
}

fn default_outbound_buffer() -> usize {
    256
}
