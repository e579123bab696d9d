//! # Upload Endpoint
//!
//! Accepts one `multipart/form-data` file and returns the path to reference
//! from registration, profile requests or proof documents. Available to any
//! caller, since students upload their photo before they have an account.

use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::blobs::MAX_UPLOAD_BYTES;
use crate::error::AppError;
use crate::state::AppState;

/// Multipart envelope overhead allowed on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// OpenAPI shape of the form.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    /// Public path of the stored file, e.g. `/uploads/1718000000000-{uuid}.png`.
    pub path: String,
}

/// Build the uploads router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/uploads", post(upload))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + MULTIPART_OVERHEAD))
}

fn multipart_error(status: StatusCode, text: String) -> AppError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(text)
    } else {
        AppError::BadRequest(text)
    }
}

/// POST /api/v1/uploads: Store one file from the `file` field.
#[utoipa::path(
    post,
    path = "/api/v1/uploads",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "File stored", body = UploadResponse),
        (status = 413, description = "File too large", body = crate::error::ErrorBody),
        (status = 422, description = "Missing, empty or unsupported file", body = crate::error::ErrorBody),
    ),
    tag = "uploads"
)]
async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let mut multipart = multipart.map_err(|e| multipart_error(e.status(), e.body_text()))?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e.status(), e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e.status(), e.body_text()))?;
        let path = state.blobs.put(&content_type, &bytes).await?;
        tracing::info!(%path, size = bytes.len(), "upload stored");
        return Ok((StatusCode::CREATED, Json(UploadResponse { path })));
    }
    Err(AppError::Validation("file field is required".into()))
}
