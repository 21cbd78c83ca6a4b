use axum::{routing::get, Router};

pub mod queues;
pub mod submissions;
pub mod system;

/// Router for all authenticated endpoints.
/// `max_document_bytes` sizes the upload body limit.
pub fn router(max_document_bytes: usize) -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/access-rules", get(system::access_rules))
        .nest("/submissions", submissions::router(max_document_bytes))
        .nest("/queues", queues::router())
}
