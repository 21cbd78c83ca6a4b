//! Audit trail records and the sink contract.
//!
//! Every state-changing or access-control-relevant action produces one
//! [`AuditEvent`]. Sinks are fire-and-forget from the workflow's point of
//! view: a failing sink must never abort the operation that triggered it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    SubmissionCreated,
    SubmissionUpdated,
    ReviewRecorded,
    SubmissionRejected,
    SubmissionCompleted,
    ExchangeAppended,
    SubmissionResubmitted,
    DocumentAttached,
    DuplicateFlagged,
    CompanyVerified,
    SubmissionViewed,
    QueueViewed,
    AccessDenied,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::SubmissionCreated => "SUBMISSION_CREATED",
            AuditAction::SubmissionUpdated => "SUBMISSION_UPDATED",
            AuditAction::ReviewRecorded => "REVIEW_RECORDED",
            AuditAction::SubmissionRejected => "SUBMISSION_REJECTED",
            AuditAction::SubmissionCompleted => "SUBMISSION_COMPLETED",
            AuditAction::ExchangeAppended => "EXCHANGE_APPENDED",
            AuditAction::SubmissionResubmitted => "SUBMISSION_RESUBMITTED",
            AuditAction::DocumentAttached => "DOCUMENT_ATTACHED",
            AuditAction::DuplicateFlagged => "DUPLICATE_FLAGGED",
            AuditAction::CompanyVerified => "COMPANY_VERIFIED",
            AuditAction::SubmissionViewed => "SUBMISSION_VIEWED",
            AuditAction::QueueViewed => "QUEUE_VIEWED",
            AuditAction::AccessDenied => "ACCESS_DENIED",
        }
    }
}

impl core::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Denied,
}

/// One append-only audit record.
///
/// `changed_fields` carries field *names* only; raw values never reach the
/// audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: AuditAction,
    pub resource: String,
    pub previous_status: Option<String>,
    pub new_status: Option<String>,
    pub outcome: AuditOutcome,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_role: Option<String>,
}

impl AuditEvent {
    pub fn success(
        actor: impl Into<String>,
        action: AuditAction,
        resource: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            timestamp: at,
            actor: actor.into(),
            action,
            resource: resource.into(),
            previous_status: None,
            new_status: None,
            outcome: AuditOutcome::Success,
            changed_fields: Vec::new(),
            required_role: None,
        }
    }

    pub fn denied(
        actor: impl Into<String>,
        resource: impl Into<String>,
        required_role: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            outcome: AuditOutcome::Denied,
            required_role,
            ..Self::success(actor, AuditAction::AccessDenied, resource, at)
        }
    }

    pub fn with_status_change(mut self, previous: Option<String>, new: Option<String>) -> Self {
        self.previous_status = previous;
        self.new_status = new;
        self
    }

    pub fn with_changed_fields(mut self, fields: Vec<String>) -> Self {
        self.changed_fields = fields;
        self
    }
}

#[derive(Debug, Error)]
pub enum AuditSinkError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Append-only destination for audit records.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent) -> Result<(), AuditSinkError>;
}

impl<S> AuditSink for std::sync::Arc<S>
where
    S: AuditSink + ?Sized,
{
    fn record(&self, event: AuditEvent) -> Result<(), AuditSinkError> {
        (**self).record(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_serialize_as_screaming_snake_case() {
        let json = serde_json::to_string(&AuditAction::SubmissionCreated).unwrap();
        assert_eq!(json, "\"SUBMISSION_CREATED\"");
        assert_eq!(AuditAction::AccessDenied.to_string(), "ACCESS_DENIED");
    }

    #[test]
    fn denied_event_carries_required_role() {
        let e = AuditEvent::denied("pat@nhs.net", "SUP-2024-AAAAA", Some("CONTRACT".into()), Utc::now());
        assert_eq!(e.outcome, AuditOutcome::Denied);
        assert_eq!(e.action, AuditAction::AccessDenied);
        assert_eq!(e.required_role.as_deref(), Some("CONTRACT"));
    }
}
