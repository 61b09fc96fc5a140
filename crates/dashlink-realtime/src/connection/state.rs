//! Lifecycle states and the caller-visible liveness snapshot.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where the channel state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ChannelState {
    /// Nothing open and nothing scheduled.
    Idle,
    /// A transport open is in flight.
    Connecting,
    /// Transport open and heartbeat healthy.
    Open,
    /// Heartbeat timed out; the transport is being torn down.
    Closing,
    /// Waiting out the delay before reconnect attempt `attempt`.
    Reconnecting {
        /// 1-based attempt number.
        attempt: u32,
    },
    /// Reconnect attempts ran out. Requires an explicit `connect()`.
    Exhausted,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closing => write!(f, "closing"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting({attempt})"),
            Self::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// Snapshot of the manager's liveness, published on every transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Liveness {
    /// Current lifecycle state.
    pub state: ChannelState,
    /// True only while the transport is open and no heartbeat timeout has
    /// fired since the last open or acknowledgment.
    pub connected: bool,
    /// Reconnect attempts scheduled since the last successful open.
    pub reconnect_attempts: u32,
    /// When the last heartbeat acknowledgment (or the open) was recorded.
    pub last_heartbeat_ack_at: Option<DateTime<Utc>>,
}

impl Default for Liveness {
    fn default() -> Self {
        Self {
            state: ChannelState::Idle,
            connected: false,
            reconnect_attempts: 0,
            last_heartbeat_ack_at: None,
        }
    }
}
