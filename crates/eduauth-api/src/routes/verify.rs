//! # Public Verification
//!
//! The only unauthenticated business endpoint. Anyone holding a certificate
//! fingerprint (typically from a QR code) can look it up.

use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::error::AppError;
use crate::extractors::extract_path;
use crate::registry::CertificateSummary;
use crate::state::AppState;

/// Build the verification router.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/v1/verify/:fingerprint", get(verify_certificate))
}

/// GET /api/v1/verify/:fingerprint: Look up a certificate.
///
/// Revoked certificates are still found; check `status`.
#[utoipa::path(
    get,
    path = "/api/v1/verify/{fingerprint}",
    params(("fingerprint" = String, Path, description = "64-character hex certificate fingerprint")),
    responses(
        (status = 200, description = "Certificate found", body = CertificateSummary),
        (status = 404, description = "Certificate not found", body = crate::error::ErrorBody),
    ),
    tag = "verification"
)]
async fn verify_certificate(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<CertificateSummary>, AppError> {
    let fingerprint = extract_path(path)?;
    Ok(Json(state.registry.verify(&fingerprint).await?))
}
