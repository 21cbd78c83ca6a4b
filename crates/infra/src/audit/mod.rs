//! Audit recording.
//!
//! [`AuditRecorder`] is the only way the workflow writes audit records. Sink
//! failures are logged and swallowed; they never roll back or fail the
//! operation that produced the record.

use std::sync::Arc;

use chrono::Utc;

use onboard_auth::{Principal, Role};
use onboard_events::{AuditAction, AuditEvent, AuditSink, AuditSinkError};

mod postgres;

pub use postgres::PostgresAuditSink;

#[derive(Clone)]
pub struct AuditRecorder {
    sink: Arc<dyn AuditSink>,
}

impl core::fmt::Debug for AuditRecorder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuditRecorder").finish_non_exhaustive()
    }
}

impl AuditRecorder {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Best-effort append.
    pub fn record(&self, event: AuditEvent) {
        let action = event.action;
        let resource = event.resource.clone();
        if let Err(err) = self.sink.record(event) {
            tracing::warn!(%action, %resource, error = %err, "audit record dropped");
        }
    }

    pub fn success(&self, actor: &Principal, action: AuditAction, resource: &str) -> AuditEvent {
        AuditEvent::success(actor.email(), action, resource, Utc::now())
    }

    /// Record a denial before it is returned to the caller.
    pub fn denied(&self, actor: &Principal, resource: &str, required_role: Option<Role>) {
        tracing::warn!(
            actor = %actor.email(),
            %resource,
            required_role = required_role.map(|r| r.as_str()).unwrap_or("-"),
            "access denied"
        );
        self.record(AuditEvent::denied(
            actor.email(),
            resource,
            required_role.map(|r| r.as_str().to_string()),
            Utc::now(),
        ));
    }
}

/// Emits audit records as structured events on the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditSinkError> {
        tracing::info!(
            target: "audit",
            audit_id = %event.id,
            timestamp = %event.timestamp,
            actor = %event.actor,
            action = %event.action,
            resource = %event.resource,
            previous_status = event.previous_status.as_deref().unwrap_or("-"),
            new_status = event.new_status.as_deref().unwrap_or("-"),
            outcome = ?event.outcome,
            changed_fields = %event.changed_fields.join(","),
            required_role = event.required_role.as_deref().unwrap_or("-"),
        );
        Ok(())
    }
}

/// Fans one record out to several sinks; succeeds if any sink accepted it.
#[derive(Clone, Default)]
pub struct FanoutAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutAuditSink {
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }
}

impl AuditSink for FanoutAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditSinkError> {
        let mut last_err = None;
        let mut accepted = false;
        for sink in &self.sinks {
            match sink.record(event.clone()) {
                Ok(()) => accepted = true,
                Err(e) => last_err = Some(e),
            }
        }
        match (accepted, last_err) {
            (true, _) | (false, None) => Ok(()),
            (false, Some(e)) => Err(e),
        }
    }
}
