//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store, audit sink and collaborator wiring
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request bodies, `If-Match` parsing and submission responses
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use onboard_auth::Hs256TokenVerifier;
use onboard_infra::AppConfig;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> anyhow::Result<Router> {
    let services = services::build_services(config).await?;
    Ok(build_router(services, &config.token_secret))
}

/// Router over already-wired services.
pub fn build_router(services: services::AppServices, token_secret: &str) -> Router {
    let auth_state = middleware::AuthState {
        verifier: Arc::new(Hs256TokenVerifier::new(token_secret.as_bytes())),
        registry: services.registry.clone(),
    };

    let max_document_bytes = services.submissions.max_document_bytes();

    // Protected routes: require a verified identity.
    let protected = routes::router(max_document_bytes)
        .layer(Extension(Arc::new(services)))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}
