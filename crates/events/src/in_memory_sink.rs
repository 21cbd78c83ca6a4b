//! In-memory audit sink for tests/dev.

use std::sync::Mutex;

use crate::audit::{AuditAction, AuditEvent, AuditSink, AuditSinkError};

/// Append-only in-memory audit log.
///
/// - No IO / no async
/// - Can be switched into a failing mode to exercise best-effort semantics
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
    failing: Mutex<bool>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `record` call fail.
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut f) = self.failing.lock() {
            *f = failing;
        }
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn events_for(&self, action: AuditAction) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.action == action)
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditSinkError> {
        if self.failing.lock().map(|f| *f).unwrap_or(true) {
            return Err(AuditSinkError::Unavailable("sink disabled".to_string()));
        }
        let mut events = self
            .events
            .lock()
            .map_err(|_| AuditSinkError::Unavailable("lock poisoned".to_string()))?;
        events.push(event);
        Ok(())
    }
}
