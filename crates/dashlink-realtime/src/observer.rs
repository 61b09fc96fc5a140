//! Host-application hooks for connection lifecycle events.

use dashlink_core::AppError;

use crate::message::types::ApplicationMessage;

/// Lifecycle callbacks. All methods default to no-ops.
///
/// Callbacks run on the channel driver task and should return quickly.
pub trait ChannelObserver: Send + Sync + 'static {
    /// The transport opened and the heartbeat cycle started.
    fn on_open(&self) {}

    /// The live connection closed, for whatever reason.
    fn on_close(&self) {}

    /// The transport reported an error. A close normally follows.
    fn on_error(&self, _error: &AppError) {}

    /// An application message arrived (before listener fan-out).
    fn on_message(&self, _message: &ApplicationMessage) {}

    /// A reconnect has been scheduled.
    fn on_reconnect_scheduled(&self, _attempt: u32, _max_attempts: u32) {}

    /// Reconnect attempts ran out; nothing happens until `connect()`.
    fn on_exhausted(&self, _attempts: u32) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ChannelObserver for NoopObserver {}
