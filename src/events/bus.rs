//! In-process publish/subscribe bus
//!
//! Handlers run synchronously on the emitting thread, in registration order.
//! A handler that panics is logged and skipped; the rest still run.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use tracing::{error, trace};

use super::{AssistantEvent, EventKind};

type Handler = Arc<dyn Fn(&AssistantEvent) + Send + Sync>;

/// Lightweight coordination bus, no persistence or replay
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<EventKind, Vec<Handler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event kind
    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&AssistantEvent) + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        handlers.entry(kind).or_default().push(Arc::new(handler));
    }

    /// Register the same handler for several kinds
    pub fn on_each<F>(&self, kinds: &[EventKind], handler: F)
    where
        F: Fn(&AssistantEvent) + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        for kind in kinds {
            handlers.entry(*kind).or_default().push(Arc::clone(&handler));
        }
    }

    /// Dispatch an event to every handler registered for its kind
    pub fn emit(&self, event: AssistantEvent) {
        let kind = event.kind();
        // Snapshot so handlers may register or emit without deadlocking.
        let snapshot: Vec<Handler> = {
            let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
            handlers.get(&kind).cloned().unwrap_or_default()
        };

        trace!(event = %event, handlers = snapshot.len(), "emit");

        for (index, handler) in snapshot.iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                error!(%kind, index, "event handler panicked");
            }
        }
    }

}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        let counts: HashMap<&str, usize> = handlers
            .iter()
            .map(|(kind, list)| (kind.as_str(), list.len()))
            .collect();
        f.debug_struct("EventBus").field("handlers", &counts).finish()
    }
}
