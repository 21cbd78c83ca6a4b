use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use onboard_auth::{Principal, RoleRegistry, TokenVerifier};

use crate::app::errors;
use crate::context::PrincipalContext;

#[derive(Clone)]
pub struct AuthState {
    pub verifier: Arc<dyn TokenVerifier>,
    pub registry: Arc<RoleRegistry>,
}

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_bearer(req.headers()).map_err(|_| unauthenticated())?;

    let identity = state.verifier.verify(token, Utc::now()).map_err(|e| {
        tracing::info!(reason = %e, "bearer token rejected");
        unauthenticated()
    })?;

    let principal = Principal::resolve(identity, &state.registry);
    tracing::debug!(actor = %principal.email(), roles = ?principal.roles(), "principal resolved");
    req.extensions_mut().insert(PrincipalContext::new(principal));

    Ok(next.run(req).await)
}

fn unauthenticated() -> Response {
    errors::json_error(
        StatusCode::UNAUTHORIZED,
        "unauthenticated",
        "Please sign in to continue.",
        None,
    )
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token)
}
