use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use onboard_auth::Role;
use onboard_infra::{ExchangeRequest, ReviewRequest, WorkflowError};
use onboard_workflow::{Decision, DocumentType, NewSubmission, Stage, SubmissionPatch};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router(max_document_bytes: usize) -> Router {
    // One byte over the service limit so oversized files hit its own check.
    let upload_limit = DefaultBodyLimit::max(max_document_bytes.saturating_add(1));

    Router::new()
        .route("/", post(create_submission).get(list_my_submissions))
        .route("/:id", get(get_submission).patch(update_submission))
        .route("/:id/permissions", get(submission_permissions))
        .route("/:id/reviews/:stage", post(record_review))
        .route("/:id/exchanges", post(post_exchange))
        .route("/:id/resubmit", post(resubmit))
        .route(
            "/:id/documents/:document_type",
            post(upload_document).layer(upload_limit),
        )
        .route("/:id/verify-company", post(verify_company))
}

fn fail(services: &AppServices, err: WorkflowError) -> axum::response::Response {
    errors::workflow_error_to_response(err, services.conceal_not_found)
}

pub async fn create_submission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<serde_json::Value>,
) -> axum::response::Response {
    let input = match NewSubmission::from_json(&body) {
        Ok(input) => input,
        Err(fields) => return fail(&services, fields.into()),
    };
    match services.submissions.create(input, principal.principal()).await {
        Ok(s) => dto::submission_response(StatusCode::CREATED, &s),
        Err(e) => fail(&services, e),
    }
}

pub async fn list_my_submissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services.submissions.list_mine(principal.principal()).await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => fail(&services, e),
    }
}

pub async fn get_submission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match errors::parse_submission_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.submissions.get(&id, principal.principal()).await {
        Ok(s) => dto::submission_response(StatusCode::OK, &s),
        Err(e) => fail(&services, e),
    }
}

/// Allow-listed partial update. Unrecognised keys are dropped, never stored.
pub async fn update_submission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> axum::response::Response {
    let id = match errors::parse_submission_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let expected = match dto::expected_version(&headers) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let parsed = match SubmissionPatch::from_json(&body) {
        Ok(parsed) => parsed,
        Err(fields) => return fail(&services, fields.into()),
    };
    if !parsed.ignored.is_empty() {
        tracing::debug!(submission_id = %id, ignored = ?parsed.ignored, "unrecognised patch keys dropped");
    }

    match services
        .submissions
        .update(&id, parsed.patch, expected, principal.principal())
        .await
    {
        Ok(s) => dto::submission_response(StatusCode::OK, &s),
        Err(e) => fail(&services, e),
    }
}

pub async fn submission_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match errors::parse_submission_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.submissions.access_report(&id, principal.principal()).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => fail(&services, e),
    }
}

pub async fn record_review(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, stage)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<dto::ReviewRequestBody>,
) -> axum::response::Response {
    let id = match errors::parse_submission_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let expected_version = match dto::expected_version(&headers) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let stage = match stage.parse::<Stage>() {
        Ok(stage) => stage,
        Err(e) => return fail(&services, e.into()),
    };
    let decision = match body.decision.parse::<Decision>() {
        Ok(decision) => decision,
        Err(e) => return fail(&services, e.into()),
    };

    let request = ReviewRequest {
        stage,
        decision,
        rationale: body.rationale,
        expected_version,
    };
    match services
        .submissions
        .record_review(&id, request, principal.principal())
        .await
    {
        Ok(s) => dto::submission_response(StatusCode::OK, &s),
        Err(e) => fail(&services, e),
    }
}

/// Contract-stage message. Contract team members post messages; the owner
/// and supplier contact post responses.
pub async fn post_exchange(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ExchangeRequestBody>,
) -> axum::response::Response {
    let id = match errors::parse_submission_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let principal = principal.principal();
    let as_drafter = match body.kind.as_deref() {
        Some("message") => true,
        Some("response") => false,
        None => principal.has_role(Role::Contract),
        Some(_) => return fail(&services, WorkflowError::invalid("kind", "must be 'message' or 'response'")),
    };
    let request = ExchangeRequest {
        body: body.message,
        attachments: body.attachments,
    };

    let result = if as_drafter {
        services.submissions.post_exchange(&id, request, principal).await
    } else {
        services.submissions.respond(&id, request, principal).await
    };
    match result {
        Ok(s) => dto::submission_response(StatusCode::CREATED, &s),
        Err(e) => fail(&services, e),
    }
}

pub async fn resubmit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match errors::parse_submission_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.submissions.resubmit(&id, principal.principal()).await {
        Ok(s) => dto::submission_response(StatusCode::OK, &s),
        Err(e) => fail(&services, e),
    }
}

/// Raw request body is the file; `?fileName=` names it.
pub async fn upload_document(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, document_type)): Path<(String, String)>,
    Query(query): Query<dto::DocumentUploadQuery>,
    bytes: Bytes,
) -> axum::response::Response {
    let id = match errors::parse_submission_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let document_type = match document_type.parse::<DocumentType>() {
        Ok(t) => t,
        Err(e) => return fail(&services, WorkflowError::invalid("documentType", e.to_string())),
    };
    match services
        .submissions
        .attach_document(&id, document_type, &query.file_name, &bytes, principal.principal())
        .await
    {
        Ok(s) => dto::submission_response(StatusCode::CREATED, &s),
        Err(e) => fail(&services, e),
    }
}

pub async fn verify_company(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match errors::parse_submission_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.submissions.verify_company(&id, principal.principal()).await {
        Ok(s) => dto::submission_response(StatusCode::OK, &s),
        Err(e) => fail(&services, e),
    }
}
