//! Fan-out of structured lifecycle events to registered listeners.

use serde_json::Value;

use crate::error::Result;

/// Observer notified of engine lifecycle events.
///
/// Dispatch is synchronous and ordered; a listener returning an error aborts
/// the running operation.
pub trait ProgressListener {
    fn on_event(&self, event: &str, payload: &Value) -> Result<()>;
}

/// Ordered collection of progress listeners. Absence of listeners makes
/// emission a no-op.
#[derive(Default)]
pub struct ProgressBus {
    listeners: Vec<Box<dyn ProgressListener>>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: Box<dyn ProgressListener>) {
        self.listeners.push(listener);
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Notifies every listener in registration order.
    pub fn emit(&self, event: &str, payload: Value) -> Result<()> {
        if self.listeners.is_empty() {
            return Ok(());
        }
        for listener in &self.listeners {
            listener.on_event(event, &payload)?;
        }
        Ok(())
    }
}
