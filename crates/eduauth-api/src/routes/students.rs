//! # Student Self-Service Endpoints
//!
//! Contact details change directly. Identity attributes (name, date of
//! birth, identity document, photo) change only through a reviewed profile
//! request.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use eduauth_core::Role;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::require_role;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, Validate};
use crate::registry::{
    ContactUpdate, OwnCertificate, Principal, ProfileRequestSubmission, ProfileRequestView,
    StudentProfileView,
};
use crate::state::AppState;

/// Omitted fields are left alone; an empty string clears the field.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ContactRequest {
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl Validate for ContactRequest {
    fn validate(&self) -> Result<(), String> {
        if self.phone.is_none() && self.address.is_none() {
            return Err("phone or address is required".to_string());
        }
        Ok(())
    }
}

/// Proposed identity changes. Omitted or blank fields are not proposed.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfileChangeRequest {
    pub full_name: Option<String>,
    /// YYYY-MM-DD.
    pub date_of_birth: Option<String>,
    pub identity_type: Option<String>,
    pub identity_number: Option<String>,
    #[serde(alias = "photo")]
    pub photo_path: Option<String>,
    /// Upload path of a supporting document. Required when the identity
    /// document changes.
    pub proof_document: Option<String>,
}

impl From<ProfileChangeRequest> for ProfileRequestSubmission {
    fn from(req: ProfileChangeRequest) -> Self {
        Self {
            full_name: req.full_name,
            date_of_birth: req.date_of_birth,
            identity_type: req.identity_type,
            identity_number: req.identity_number,
            photo_path: req.photo_path,
            proof_document: req.proof_document,
        }
    }
}

/// Build the student router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/students/me/certificates", get(list_own_certificates))
        .route("/api/v1/students/me/profile", get(my_profile))
        .route("/api/v1/students/me/contact", patch(update_contact))
        .route("/api/v1/students/me/profile-request", post(submit_profile_request))
}

/// GET /api/v1/students/me/certificates: The caller's certificates.
#[utoipa::path(
    get,
    path = "/api/v1/students/me/certificates",
    responses(
        (status = 200, description = "Own certificates, newest first", body = Vec<OwnCertificate>),
        (status = 403, description = "Student role required", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "students"
)]
async fn list_own_certificates(
    State(state): State<AppState>,
    caller: Principal,
) -> Result<Json<Vec<OwnCertificate>>, AppError> {
    require_role(&caller, Role::Student)?;
    Ok(Json(state.registry.my_certificates(&caller)?))
}

/// GET /api/v1/students/me/profile: The caller's profile.
#[utoipa::path(
    get,
    path = "/api/v1/students/me/profile",
    responses(
        (status = 200, description = "Student profile", body = StudentProfileView),
        (status = 403, description = "Student role required", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "students"
)]
async fn my_profile(
    State(state): State<AppState>,
    caller: Principal,
) -> Result<Json<StudentProfileView>, AppError> {
    require_role(&caller, Role::Student)?;
    Ok(Json(state.registry.my_profile(caller.user_id)?))
}

/// PATCH /api/v1/students/me/contact: Update phone and address.
#[utoipa::path(
    patch,
    path = "/api/v1/students/me/contact",
    request_body = ContactRequest,
    responses(
        (status = 200, description = "Updated profile", body = StudentProfileView),
        (status = 422, description = "Nothing to update, or a field is too long", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "students"
)]
async fn update_contact(
    State(state): State<AppState>,
    caller: Principal,
    body: Result<Json<ContactRequest>, JsonRejection>,
) -> Result<Json<StudentProfileView>, AppError> {
    require_role(&caller, Role::Student)?;
    let req = extract_validated_json(body)?;
    let view = state
        .registry
        .update_contact(
            caller.user_id,
            ContactUpdate {
                phone: req.phone,
                address: req.address,
            },
        )
        .await?;
    Ok(Json(view))
}

/// POST /api/v1/students/me/profile-request: Propose identity changes.
#[utoipa::path(
    post,
    path = "/api/v1/students/me/profile-request",
    request_body = ProfileChangeRequest,
    responses(
        (status = 201, description = "Request submitted for review", body = ProfileRequestView),
        (status = 409, description = "A request is already pending, or the identity number is taken", body = crate::error::ErrorBody),
        (status = 422, description = "No changes, or proof document missing", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "students"
)]
async fn submit_profile_request(
    State(state): State<AppState>,
    caller: Principal,
    body: Result<Json<ProfileChangeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ProfileRequestView>), AppError> {
    require_role(&caller, Role::Student)?;
    let req = extract_json(body)?;
    let view = state
        .registry
        .submit_profile_request(caller.user_id, req.into())
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}
