//! Inbound and outbound frame type definitions.
//!
//! Every frame is a UTF-8 JSON object with a `type` discriminator.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tag of the heartbeat probe sent by the client.
pub const HEARTBEAT_PROBE_TYPE: &str = "heartbeat";

/// Tags accepted as a heartbeat acknowledgment.
///
/// `heartbeat_ack` is current; `heartbeat` and `pong` are still sent by
/// older servers.
pub const HEARTBEAT_ACK_TYPES: [&str; 3] = ["heartbeat_ack", "heartbeat", "pong"];

/// Whether a frame tag denotes a heartbeat acknowledgment.
pub fn is_heartbeat_ack(kind: &str) -> bool {
    HEARTBEAT_ACK_TYPES.contains(&kind)
}

/// A server-pushed application event, forwarded to listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationMessage {
    /// The `type` discriminator.
    #[serde(rename = "type")]
    pub kind: String,
    /// Event payload, `null` when absent.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    /// Any other top-level fields, preserved as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ApplicationMessage {
    /// Build a message with the given tag and payload.
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
            extra: Map::new(),
        }
    }
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Liveness reply to a heartbeat probe. Never forwarded to listeners.
    HeartbeatAck {
        /// Optional `data.message` text sent along with the ack.
        note: Option<String>,
    },
    /// Anything else.
    Application(ApplicationMessage),
}

impl From<ApplicationMessage> for InboundFrame {
    fn from(msg: ApplicationMessage) -> Self {
        if is_heartbeat_ack(&msg.kind) {
            let note = msg
                .data
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string);
            Self::HeartbeatAck { note }
        } else {
            Self::Application(msg)
        }
    }
}

/// Control frames emitted by the channel manager itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Heartbeat probe.
    Heartbeat {
        /// Client send time, epoch milliseconds.
        timestamp: i64,
    },
}

impl ControlMessage {
    /// A probe stamped with the current wall-clock time.
    pub fn heartbeat_now() -> Self {
        Self::Heartbeat {
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}
