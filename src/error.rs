//! Error taxonomy (spec.md §7) as a plain enum implementing
//! `axum::response::IntoResponse`, matched once to produce the HTTP
//! status/body — the same shape as the teacher's `auth::api::AuthApiError`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

#[derive(Debug)]
pub enum IngestError {
    AuthRejected(&'static str),
    MalformedRequest(String),
    VendorUnavailable(String),
    VendorNoResult(String),
    VendorMissingIdentity,
    StoreError(String),
    Conflict(String),
    Internal(String),
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::AuthRejected(m) => write!(f, "auth rejected: {m}"),
            IngestError::MalformedRequest(m) => write!(f, "malformed request: {m}"),
            IngestError::VendorUnavailable(m) => write!(f, "vendor unavailable: {m}"),
            IngestError::VendorNoResult(m) => write!(f, "vendor returned no result: {m}"),
            IngestError::VendorMissingIdentity => write!(f, "vendor record missing identity"),
            IngestError::StoreError(m) => write!(f, "store error: {m}"),
            IngestError::Conflict(m) => write!(f, "conflict: {m}"),
            IngestError::Internal(m) => write!(f, "internal error: {m}"),
        }
    }
}

impl std::error::Error for IngestError {}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            IngestError::AuthRejected(m) => (StatusCode::UNAUTHORIZED, m.to_string()),
            IngestError::MalformedRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            IngestError::VendorUnavailable(m) => (StatusCode::BAD_GATEWAY, m.clone()),
            IngestError::VendorNoResult(m) => (StatusCode::NOT_FOUND, m.clone()),
            IngestError::VendorMissingIdentity => {
                (StatusCode::UNPROCESSABLE_ENTITY, "vendor record has no APN".to_string())
            }
            IngestError::StoreError(m) => (StatusCode::INTERNAL_SERVER_ERROR, m.clone()),
            IngestError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
            IngestError::Internal(m) => {
                error!(error = %m, "ingest.error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        (status, Json(json!({ "success": false, "error": detail }))).into_response()
    }
}
