use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(principal): Extension<PrincipalContext>) -> impl IntoResponse {
    let principal = principal.principal();
    Json(serde_json::json!({
        "email": principal.email(),
        "displayName": principal.display_name(),
        "roles": principal.roles().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        "isAdmin": principal.is_admin(),
    }))
}

/// Stage, role and transition tables for client-side guards.
///
/// Advisory only: the server re-evaluates every request.
pub async fn access_rules(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "rules": services.submissions.rule_table(),
        "roles": services.registry.definitions(),
    }))
}
