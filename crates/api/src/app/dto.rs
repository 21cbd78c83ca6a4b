use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use onboard_core::AggregateRoot;
use onboard_workflow::Submission;

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct ReviewRequestBody {
    pub decision: String,
    #[serde(default)]
    pub rationale: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRequestBody {
    pub message: String,
    #[serde(default)]
    pub attachments: Vec<String>,
    /// `message` (contract team) or `response` (owner / supplier).
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUploadQuery {
    pub file_name: String,
}

// -------------------------
// Headers
// -------------------------

/// Optional `If-Match: "<version>"` precondition.
pub fn expected_version(headers: &HeaderMap) -> Result<Option<u64>, axum::response::Response> {
    let Some(raw) = headers.get(header::IF_MATCH) else {
        return Ok(None);
    };
    let invalid = || {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "If-Match must carry the submission version",
            None,
        )
    };
    let value = raw.to_str().map_err(|_| invalid())?;
    let value = value.trim().trim_start_matches("W/").trim_matches('"');
    value.parse::<u64>().map(Some).map_err(|_| invalid())
}

// -------------------------
// Responses
// -------------------------

/// The submission as JSON with its version as the `ETag`.
pub fn submission_response(status: StatusCode, submission: &Submission) -> axum::response::Response {
    let mut response = (status, Json(submission)).into_response();
    if let Ok(etag) = HeaderValue::from_str(&format!("\"{}\"", submission.version())) {
        response.headers_mut().insert(header::ETAG, etag);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn if_match_accepts_quoted_and_weak_versions() {
        let mut headers = HeaderMap::new();
        assert_eq!(expected_version(&headers).unwrap(), None);

        headers.insert(header::IF_MATCH, HeaderValue::from_static("\"3\""));
        assert_eq!(expected_version(&headers).unwrap(), Some(3));

        headers.insert(header::IF_MATCH, HeaderValue::from_static("W/\"7\""));
        assert_eq!(expected_version(&headers).unwrap(), Some(7));

        headers.insert(header::IF_MATCH, HeaderValue::from_static("*"));
        assert!(expected_version(&headers).is_err());
    }
}
