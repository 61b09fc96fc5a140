//! Ordered id → listener registry with snapshot dispatch.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};

use tracing::{error, warn};

use dashlink_core::AppResult;

use crate::message::types::ApplicationMessage;

/// Receives every inbound application message.
pub trait MessageListener: Send + Sync {
    /// Handle one message. Errors are logged and do not affect other listeners.
    fn on_message(&self, message: &ApplicationMessage) -> AppResult<()>;
}

impl<F> MessageListener for F
where
    F: Fn(&ApplicationMessage) -> AppResult<()> + Send + Sync,
{
    fn on_message(&self, message: &ApplicationMessage) -> AppResult<()> {
        self(message)
    }
}

type Entry = (String, Arc<dyn MessageListener>);

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Listeners that returned `Ok`.
    pub delivered: usize,
    /// Listeners that returned an error or panicked.
    pub failed: usize,
}

/// Listener registry keyed by caller-chosen id.
///
/// Dispatch order is registration order; replacing an id keeps its slot.
#[derive(Default)]
pub struct ListenerRegistry {
    entries: Mutex<Vec<Entry>>,
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}

impl ListenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the listener for `id`.
    pub fn register(&self, id: impl Into<String>, listener: Arc<dyn MessageListener>) {
        let id = id.into();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.iter_mut().find(|(existing, _)| *existing == id) {
            Some(slot) => slot.1 = listener,
            None => entries.push((id, listener)),
        }
    }

    /// Remove the listener for `id`. Returns whether one was present.
    pub fn unregister(&self, id: &str) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|(existing, _)| existing != id);
        entries.len() < before
    }

    /// Remove every listener.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered ids in dispatch order.
    pub fn ids(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn snapshot(&self) -> Vec<Entry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Deliver `message` to every listener registered at call time.
    ///
    /// The lock is not held while listeners run, so a listener may register
    /// or unregister without affecting the delivery in progress.
    pub fn dispatch(&self, message: &ApplicationMessage) -> DispatchReport {
        let mut report = DispatchReport::default();

        for (id, listener) in self.snapshot() {
            match catch_unwind(AssertUnwindSafe(|| listener.on_message(message))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    warn!(listener = %id, kind = %message.kind, error = %e, "Listener failed");
                    report.failed += 1;
                }
                Err(_) => {
                    error!(listener = %id, kind = %message.kind, "Listener panicked");
                    report.failed += 1;
                }
            }
        }

        report
    }
}
