//! # dashlink-realtime
//!
//! Client side of the dashboard live-update channel. Provides:
//!
//! - A single self-healing connection per [`ChannelManager`]
//! - Application-level heartbeat with an acknowledgment deadline
//! - Fixed-interval reconnects with an attempt ceiling
//! - Ordered listener fan-out with per-listener failure isolation
//! - WebSocket and in-memory transports

pub mod client;
pub mod connection;
pub mod listener;
pub mod message;
pub mod metrics;
pub mod observer;
pub mod transport;

pub use client::{CredentialSource, DashboardClient, StaticCredential};
pub use connection::{ChannelManager, ChannelManagerBuilder, ChannelState, Liveness};
pub use listener::{DispatchReport, ListenerRegistry, MessageListener};
pub use message::types::{ApplicationMessage, ControlMessage, InboundFrame};
pub use metrics::{ChannelMetrics, MetricsSnapshot};
pub use observer::{ChannelObserver, NoopObserver};
pub use transport::{Connector, MemoryConnector, MemoryPeer, Transport, WsConnector};
