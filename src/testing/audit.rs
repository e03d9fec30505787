use std::sync::{Arc, Mutex};

use crate::billing::{BillingAuditEvent, BillingAuditLogger};

/// Audit logger that keeps every event in memory.
#[derive(Debug, Default, Clone)]
pub struct RecordingAuditLogger {
    events: Arc<Mutex<Vec<BillingAuditEvent>>>,
}

impl RecordingAuditLogger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events logged so far.
    pub fn events(&self) -> Vec<BillingAuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl BillingAuditLogger for RecordingAuditLogger {
    async fn log(&self, event: BillingAuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
