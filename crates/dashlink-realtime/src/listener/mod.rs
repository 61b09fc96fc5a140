//! Caller-registered message listeners.

pub mod registry;

pub use registry::{DispatchReport, ListenerRegistry, MessageListener};
