use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use onboard_core::SubmissionId;
use onboard_infra::WorkflowError;

const DENIED_MESSAGE: &str = "You do not have access to this item. Quote the reference if you need help.";
const NOT_FOUND_MESSAGE: &str = "No submission exists with this reference.";
const UNAVAILABLE_MESSAGE: &str = "The service is temporarily unavailable. Please try again shortly.";

/// Map a typed workflow outcome to a JSON error body.
///
/// Denials and not-found carry a neutral message plus the reference; with
/// `conceal_not_found` a missing submission is indistinguishable from a
/// denied one. Internal error text only reaches the logs.
pub fn workflow_error_to_response(err: WorkflowError, conceal_not_found: bool) -> axum::response::Response {
    match err {
        WorkflowError::Unauthenticated => json_error(
            StatusCode::UNAUTHORIZED,
            "unauthenticated",
            "Please sign in to continue.",
            None,
        ),
        WorkflowError::AccessDenied { resource, .. } => denied(&resource),
        WorkflowError::NotFound(reference) if conceal_not_found => denied(&reference),
        WorkflowError::NotFound(reference) => {
            json_error(StatusCode::NOT_FOUND, "not_found", NOT_FOUND_MESSAGE, Some(&reference))
        }
        WorkflowError::Validation(fields) => (
            StatusCode::BAD_REQUEST,
            axum::Json(json!({
                "error": "validation_error",
                "message": "Some fields are invalid.",
                "reference": null,
                "fields": fields,
            })),
        )
            .into_response(),
        WorkflowError::Transition(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "transition_error", msg, None)
        }
        WorkflowError::Conflict(msg) => {
            tracing::info!(reason = %msg, "stale write rejected");
            json_error(
                StatusCode::CONFLICT,
                "conflict",
                "This submission was changed by someone else. Reload and try again.",
                None,
            )
        }
        err @ WorkflowError::Store(_) => {
            tracing::error!(error = %err, "store failure");
            json_error(StatusCode::SERVICE_UNAVAILABLE, err.code(), UNAVAILABLE_MESSAGE, None)
        }
        err @ WorkflowError::External(_) => {
            tracing::error!(error = %err, "external collaborator failure");
            json_error(StatusCode::BAD_GATEWAY, err.code(), UNAVAILABLE_MESSAGE, None)
        }
    }
}

fn denied(reference: &str) -> axum::response::Response {
    json_error(
        StatusCode::FORBIDDEN,
        "access_denied",
        DENIED_MESSAGE,
        Some(reference).filter(|r| !r.is_empty()),
    )
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
    reference: Option<&str>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
            "reference": reference,
        })),
    )
        .into_response()
}

pub fn parse_submission_id(raw: &str) -> Result<SubmissionId, axum::response::Response> {
    raw.parse::<SubmissionId>().map_err(|_| {
        json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "submission reference must look like SUP-YYYY-XXXXX",
            None,
        )
    })
}

#[cfg(test)]
mod tests {
    use onboard_auth::Role;

    use super::*;

    #[test]
    fn concealed_not_found_looks_like_a_denial() {
        let concealed = workflow_error_to_response(WorkflowError::NotFound("SUP-2024-AAAAA".into()), true);
        let denied = workflow_error_to_response(WorkflowError::denied("SUP-2024-AAAAA", Some(Role::Pbp)), true);
        assert_eq!(concealed.status(), StatusCode::FORBIDDEN);
        assert_eq!(concealed.status(), denied.status());

        let open = workflow_error_to_response(WorkflowError::NotFound("SUP-2024-AAAAA".into()), false);
        assert_eq!(open.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn transition_and_conflict_statuses() {
        assert_eq!(
            workflow_error_to_response(WorkflowError::Transition("x".into()), true).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            workflow_error_to_response(WorkflowError::Conflict("x".into()), true).status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn malformed_reference_is_a_bad_request() {
        assert!(parse_submission_id("SUP-2024-7K2QD").is_ok());
        let err = parse_submission_id("42").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
