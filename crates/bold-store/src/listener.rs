//! Synchronous listener fan-out.
//!
//! A [`ListenerSet`] delivers every [`GraphEvent`] to all subscribers in
//! subscription order, on the publishing thread. The store publishes
//! statement events while it still holds its write lock, so listeners
//! observe mutations in exactly the order they were applied. Listeners must
//! therefore never call back into the publishing store.

use std::sync::{Arc, PoisonError, RwLock};

use bold_types::GraphEvent;

/// A subscriber to graph events.
pub trait GraphListener: Send + Sync {
    /// Handle one event. Must not block and must not re-enter the store.
    fn on_event(&self, event: &GraphEvent);
}

/// An ordered set of listeners sharing one event stream.
#[derive(Default)]
pub struct ListenerSet {
    listeners: RwLock<Vec<Arc<dyn GraphListener>>>,
}

impl ListenerSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener. It receives every event published afterwards.
    pub fn subscribe(&self, listener: Arc<dyn GraphListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Deliver `event` to every listener.
    pub fn publish(&self, event: &GraphEvent) {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener.on_event(event);
        }
    }

    /// Number of subscribed listeners.
    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no listener is subscribed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("listeners", &self.len())
            .finish()
    }
}
