//! # Certificate Endpoints

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use eduauth_core::{MetadataPayload, Role};
use serde::Deserialize;
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::auth::require_role;
use crate::error::AppError;
use crate::extractors::extract_json;
use crate::registry::{IssueRequest, IssuedCertificate, OwnCertificate, Principal};
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssueCertificateRequest {
    pub local_student_id: Option<String>,
    pub credential_name: Option<String>,
    /// "degree", "diploma", "transcript" or "certificate".
    #[serde(alias = "type")]
    pub certificate_type: Option<String>,
    /// YYYY-MM-DD.
    pub issue_date: Option<String>,
    pub field_of_study: Option<String>,
    pub grade: Option<String>,
    /// Tagged metadata: `{"schema": "academic", ...}` or
    /// `{"schema": "legacy_details", "details": {...}}`.
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<MetadataPayload>,
    /// Untagged key/value bag sent by older clients. Read as
    /// `legacy_details` metadata; cannot be combined with `metadata`.
    #[schema(value_type = Option<Object>)]
    pub details: Option<Map<String, Value>>,
}

impl IssueCertificateRequest {
    fn into_issue_request(self) -> Result<IssueRequest, AppError> {
        let metadata = match (self.metadata, self.details) {
            (Some(_), Some(_)) => {
                return Err(AppError::Validation(
                    "send either metadata or details, not both".into(),
                ))
            }
            (Some(payload), None) => Some(payload),
            (None, Some(details)) => Some(MetadataPayload::LegacyDetails { details }),
            (None, None) => None,
        };
        Ok(IssueRequest {
            local_student_id: self.local_student_id,
            credential_name: self.credential_name,
            certificate_type: self.certificate_type,
            issue_date: self.issue_date,
            field_of_study: self.field_of_study,
            grade: self.grade,
            metadata,
        })
    }
}

/// Build the certificates router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/certificates/issue", post(issue))
        .route("/api/v1/certificates/me", get(my_certificates))
}

/// POST /api/v1/certificates/issue: Issue a certificate to an enrolled student.
#[utoipa::path(
    post,
    path = "/api/v1/certificates/issue",
    request_body = IssueCertificateRequest,
    responses(
        (status = 201, description = "Certificate issued", body = IssuedCertificate),
        (status = 403, description = "Caller may not issue here or student not enrolled", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid issuance request", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "certificates"
)]
async fn issue(
    State(state): State<AppState>,
    caller: Principal,
    body: Result<Json<IssueCertificateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<IssuedCertificate>), AppError> {
    require_role(&caller, Role::Institution)?;
    let req = extract_json(body)?;
    let issued = state.registry.issue(&caller, req.into_issue_request()?).await?;
    Ok((StatusCode::CREATED, Json(issued)))
}

/// GET /api/v1/certificates/me: The calling student's certificates.
#[utoipa::path(
    get,
    path = "/api/v1/certificates/me",
    responses(
        (status = 200, description = "Own certificates, newest first", body = Vec<OwnCertificate>),
        (status = 403, description = "Student role required", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "certificates"
)]
async fn my_certificates(
    State(state): State<AppState>,
    caller: Principal,
) -> Result<Json<Vec<OwnCertificate>>, AppError> {
    require_role(&caller, Role::Student)?;
    Ok(Json(state.registry.my_certificates(&caller)?))
}
