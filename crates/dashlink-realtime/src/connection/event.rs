//! Events consumed by the channel driver.

use dashlink_core::AppError;

/// Everything that can move the state machine, in one FIFO queue.
///
/// Transport events carry the generation of the connection that produced
/// them; timer events carry the sequence number of the arming. The driver
/// drops events whose generation or sequence is no longer current.
#[derive(Debug)]
pub(crate) enum DriverEvent {
    /// The transport for `generation` finished its handshake.
    Opened { generation: u64 },
    /// A text frame arrived.
    Frame { generation: u64, text: String },
    /// The transport reported an error.
    TransportError { generation: u64, error: AppError },
    /// The transport is gone. Sent exactly once per connection.
    Closed { generation: u64 },
    /// Heartbeat period elapsed.
    HeartbeatTick { generation: u64 },
    /// Heartbeat acknowledgment deadline elapsed.
    HeartbeatTimeout { seq: u64 },
    /// Reconnect delay elapsed.
    ReconnectDue { seq: u64 },
}
