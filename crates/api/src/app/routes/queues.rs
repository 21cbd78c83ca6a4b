use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new().route("/:stage", get(stage_queue))
}

pub async fn stage_queue(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(stage): Path<String>,
) -> axum::response::Response {
    match services.queues.queue_for(&stage, principal.principal()).await {
        Ok(items) => (
            StatusCode::OK,
            Json(serde_json::json!({ "stage": stage, "items": items })),
        )
            .into_response(),
        Err(e) => errors::workflow_error_to_response(e, services.conceal_not_found),
    }
}
