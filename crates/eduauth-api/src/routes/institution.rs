//! # Institution Endpoints
//!
//! Enrollment roster management. The institution is always the caller's
//! own; there is no way to address another institution's roster.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use eduauth_core::{InstitutionId, Role};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::auth::require_role;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_query};
use crate::registry::{EnrolledStudent, EnrollmentFilter, NewEnrollment, Principal};
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnrollRequest {
    /// The institution's own roll or registration number for the student.
    pub local_student_id: Option<String>,
    /// The student's identity number. Never stored.
    #[serde(alias = "nid")]
    pub identity_number: Option<String>,
    pub department: Option<String>,
    pub session: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RosterQuery {
    pub session: Option<String>,
    pub department: Option<String>,
}

/// The caller's institution id. 403 for anyone else.
pub(crate) fn own_institution(caller: &Principal) -> Result<InstitutionId, AppError> {
    require_role(caller, Role::Institution)?;
    caller
        .institution_id
        .ok_or_else(|| AppError::Forbidden("institution profile not found".into()))
}

/// Build the institution router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/institution/enroll", post(enroll))
        .route("/api/v1/institution/students", get(list_students))
}

/// POST /api/v1/institution/enroll: Link a registered student to this
/// institution.
#[utoipa::path(
    post,
    path = "/api/v1/institution/enroll",
    request_body = EnrollRequest,
    responses(
        (status = 201, description = "Student enrolled", body = EnrolledStudent),
        (status = 404, description = "No student with this identity number", body = crate::error::ErrorBody),
        (status = 409, description = "Already enrolled, or local id in use", body = crate::error::ErrorBody),
        (status = 422, description = "Missing fields", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "institution"
)]
async fn enroll(
    State(state): State<AppState>,
    caller: Principal,
    body: Result<Json<EnrollRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EnrolledStudent>), AppError> {
    let institution = own_institution(&caller)?;
    let req = extract_json(body)?;
    let enrollment = NewEnrollment::new(
        req.local_student_id.as_deref(),
        req.identity_number.as_deref(),
        req.department.as_deref(),
        req.session.as_deref(),
    )?;
    let enrolled = state.registry.enroll(institution, enrollment).await?;
    Ok((StatusCode::CREATED, Json(enrolled)))
}

/// GET /api/v1/institution/students: This institution's roster.
#[utoipa::path(
    get,
    path = "/api/v1/institution/students",
    params(RosterQuery),
    responses(
        (status = 200, description = "Enrolled students", body = Vec<EnrolledStudent>),
        (status = 403, description = "Institution role required", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "institution"
)]
async fn list_students(
    State(state): State<AppState>,
    caller: Principal,
    query: Result<Query<RosterQuery>, QueryRejection>,
) -> Result<Json<Vec<EnrolledStudent>>, AppError> {
    let institution = own_institution(&caller)?;
    let query = extract_query(query)?;
    let filter = EnrollmentFilter::new(query.session.as_deref(), query.department.as_deref());
    Ok(Json(state.registry.list_enrolled(institution, &filter)))
}
