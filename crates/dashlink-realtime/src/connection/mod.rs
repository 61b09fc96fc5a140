//! Connection lifecycle: handle, heartbeat, reconnect scheduling, and the
//! driver task that owns the state machine.

pub(crate) mod driver;
pub(crate) mod event;
pub mod handle;
pub(crate) mod heartbeat;
pub mod manager;
pub(crate) mod reconnect;
pub mod state;
pub(crate) mod timer;

pub use handle::ConnectionHandle;
pub use manager::{ChannelManager, ChannelManagerBuilder};
pub use state::{ChannelState, Liveness};
