use thiserror::Error;

use onboard_auth::Role;
use onboard_core::DomainError;
use onboard_workflow::FieldErrors;

use crate::external::ExternalError;
use crate::store::StoreError;

/// Typed outcome of every State Store and work queue operation.
///
/// Authorization failures never escape as anything but `AccessDenied`; store
/// failures stay `Store` and are never downgraded to a denial.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("access denied to {resource}")]
    AccessDenied {
        resource: String,
        required_role: Option<Role>,
    },

    #[error("submission not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(FieldErrors),

    #[error("invalid transition: {0}")]
    Transition(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("external service error: {0}")]
    External(#[from] ExternalError),
}

impl WorkflowError {
    pub fn denied(resource: impl Into<String>, required_role: Option<Role>) -> Self {
        Self::AccessDenied {
            resource: resource.into(),
            required_role,
        }
    }

    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(FieldErrors::single(field, message))
    }

    /// Short machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::Unauthenticated => "unauthenticated",
            WorkflowError::AccessDenied { .. } => "access_denied",
            WorkflowError::NotFound(_) => "not_found",
            WorkflowError::Validation(_) => "validation_error",
            WorkflowError::Transition(_) => "transition_error",
            WorkflowError::Conflict(_) => "conflict",
            WorkflowError::Store(_) => "store_unavailable",
            WorkflowError::External(_) => "external_unavailable",
        }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => WorkflowError::Conflict(msg),
            StoreError::Missing(id) => WorkflowError::NotFound(id.to_string()),
            other => WorkflowError::Store(other),
        }
    }
}

impl From<DomainError> for WorkflowError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => WorkflowError::invalid("request", msg),
            DomainError::InvalidTransition(msg) => WorkflowError::Transition(msg),
            DomainError::InvalidId(msg) => WorkflowError::invalid("submissionId", msg),
            DomainError::NotFound => WorkflowError::NotFound(String::new()),
            DomainError::Conflict(msg) => WorkflowError::Conflict(msg),
            DomainError::Unauthorized => WorkflowError::denied("", None),
        }
    }
}

impl From<FieldErrors> for WorkflowError {
    fn from(value: FieldErrors) -> Self {
        WorkflowError::Validation(value)
    }
}
