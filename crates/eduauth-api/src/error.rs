//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps [`RegistryError`] kinds to HTTP status codes and returns a JSON body
//! with a machine-readable code and the human-readable message. Storage and
//! other internal failures are logged and reported as "operation failed".

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::blobs::BlobError;
use crate::registry::RegistryError;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "VALIDATION_ERROR").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details, present only for client errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.to_string(),
                message: message.into(),
                details: None,
            },
        }
    }
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing, invalid or expired session (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Conflict with current state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Upload exceeds the size limit (413).
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    /// The message shown to the client.
    fn client_message(&self) -> String {
        match self {
            Self::NotFound(m)
            | Self::Validation(m)
            | Self::BadRequest(m)
            | Self::Unauthorized(m)
            | Self::Forbidden(m)
            | Self::Conflict(m)
            | Self::PayloadTooLarge(m) => m.clone(),
            Self::Internal(_) => "operation failed".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if matches!(&self, Self::Internal(_)) {
            tracing::error!(error = %self, "internal server error");
        }

        (status, Json(ErrorBody::new(code, self.client_message()))).into_response()
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Validation(m) => Self::Validation(m),
            RegistryError::Authentication(m) => Self::Unauthorized(m),
            RegistryError::Authorization(m) => Self::Forbidden(m),
            RegistryError::NotFound(m) => Self::NotFound(m),
            RegistryError::Conflict(m) => Self::Conflict(m),
            RegistryError::Persistence(m) => Self::Internal(m),
        }
    }
}

impl From<eduauth_core::ValidationError> for AppError {
    fn from(err: eduauth_core::ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<BlobError> for AppError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::TooLarge { .. } => Self::PayloadTooLarge(err.to_string()),
            BlobError::UnsupportedType(_) | BlobError::Empty => Self::Validation(err.to_string()),
            BlobError::Io(_) => Self::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn boundary_only_errors_have_their_own_codes() {
        let cases = [
            (AppError::BadRequest("malformed JSON".into()), 400, "BAD_REQUEST"),
            (AppError::PayloadTooLarge("file exceeds".into()), 413, "PAYLOAD_TOO_LARGE"),
            (AppError::Internal("pool timed out".into()), 500, "INTERNAL_ERROR"),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status_and_code(), (StatusCode::from_u16(status).unwrap(), code));
        }
    }

    #[test]
    fn blob_errors_split_between_client_and_server() {
        let too_large = AppError::from(BlobError::TooLarge { max: 10 });
        assert!(matches!(too_large, AppError::PayloadTooLarge(_)));
        let bad_type = AppError::from(BlobError::UnsupportedType("text/plain".into()));
        assert!(matches!(bad_type, AppError::Validation(_)));
        let io = AppError::from(BlobError::Io(std::io::Error::other("disk full")));
        assert_eq!(io.client_message(), "operation failed");
    }

    #[test]
    fn validation_error_keeps_the_field_name() {
        let err = AppError::from(eduauth_core::ValidationError::MissingField { field: "email" });
        assert!(matches!(&err, AppError::Validation(m) if m.contains("email")));
    }

    #[test]
    fn registry_errors_map_by_kind() {
        let cases = [
            (RegistryError::Validation("v".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (RegistryError::Authentication("a".into()), StatusCode::UNAUTHORIZED),
            (RegistryError::Authorization("f".into()), StatusCode::FORBIDDEN),
            (RegistryError::NotFound("n".into()), StatusCode::NOT_FOUND),
            (RegistryError::Conflict("c".into()), StatusCode::CONFLICT),
            (RegistryError::Persistence("p".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(AppError::from(err).status_and_code().0, expected);
        }
    }

    #[tokio::test]
    async fn client_errors_carry_the_plain_message() {
        let response = AppError::Conflict("user already exists".into()).into_response();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "CONFLICT");
        assert_eq!(json["error"]["message"], "user already exists");
        assert!(json["error"].get("details").is_none());
    }

    #[tokio::test]
    async fn internal_errors_hide_detail() {
        let response = AppError::Internal("password=hunter2 leaked".into()).into_response();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["message"], "operation failed");
        assert!(!String::from_utf8_lossy(&body).contains("hunter2"));
    }
}
