//! Handler registry.
//!
//! Handlers are registered per [`EventKind`] and invoked synchronously by
//! the receive loop, one event at a time, in frame order. A handler that
//! panics is logged and skipped; the remaining handlers still run.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::domain::session::SessionKind;
use crate::domain::stream::{EventKind, StreamEvent};
use crate::infrastructure::metrics;

/// A stream event handler.
pub type EventHandler = Arc<dyn Fn(&StreamEvent) + Send + Sync>;

/// Event handlers keyed by event kind.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<EventKind, Vec<EventHandler>>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler for `kind`. Handlers run in registration order.
    pub fn register<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.handlers.write().entry(kind).or_default().push(Arc::new(handler));
    }

    /// Number of handlers registered for `kind`.
    #[must_use]
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.read().get(&kind).map_or(0, Vec::len)
    }

    /// Invoke every handler registered for the event's kind.
    ///
    /// Returns the number of handlers that completed without panicking.
    pub fn dispatch(&self, session: SessionKind, event: &StreamEvent) -> usize {
        // Clone out so handlers may register further handlers.
        let handlers = self.handlers.read().get(&event.kind).cloned().unwrap_or_default();

        let mut completed = 0;
        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_ok() {
                completed += 1;
            } else {
                tracing::error!(
                    session = %session,
                    kind = event.kind.as_str(),
                    "Stream handler panicked"
                );
                metrics::record_handler_panic(session, event.kind);
            }
        }
        completed
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read();
        let counts: HashMap<_, _> = handlers
            .iter()
            .map(|(kind, list)| (*kind, list.len()))
            .collect();
        f.debug_struct("HandlerRegistry").field("handlers", &counts).finish()
    }
}
