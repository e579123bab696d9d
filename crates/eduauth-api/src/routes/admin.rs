//! # Administration Endpoints
//!
//! Every handler requires the admin role. Covers the approval queue,
//! institution issuance permission, and profile-request review.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use eduauth_core::{ProfileRequestId, Role, UserId};
use eduauth_state::{ReviewDecision, ReviewStatus};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::ActionResponse;
use crate::auth::require_role;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_path, extract_query};
use crate::registry::{InstitutionListing, PendingAccount, Principal, ProfileRequestView};
use crate::state::AppState;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PendingQuery {
    /// "student" or "institution".
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProfileRequestQuery {
    /// "pending" (default), "approved" or "rejected".
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequest {
    pub can_issue: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PermissionResponse {
    pub message: String,
    pub can_issue: bool,
    /// False when the flag already had the requested value.
    pub changed: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReviewRequest {
    /// "approve" or "reject".
    #[schema(value_type = String, example = "approve")]
    pub decision: ReviewDecision,
    pub comment: Option<String>,
}

/// Build the admin router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/admin/pending", get(list_pending))
        .route("/api/v1/admin/institutions", get(list_institutions))
        .route("/api/v1/admin/approve/:user_id", put(approve))
        .route("/api/v1/admin/reject/:user_id", put(reject))
        .route("/api/v1/admin/permission/:user_id", put(set_permission))
        .route("/api/v1/admin/profile-requests", get(list_profile_requests))
        .route("/api/v1/admin/profile-requests/:id", put(review_profile_request))
}

/// GET /api/v1/admin/pending: Accounts awaiting approval.
#[utoipa::path(
    get,
    path = "/api/v1/admin/pending",
    params(PendingQuery),
    responses(
        (status = 200, description = "Pending accounts, oldest first", body = Vec<PendingAccount>),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
        (status = 422, description = "Missing or unknown type", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
async fn list_pending(
    State(state): State<AppState>,
    caller: Principal,
    query: Result<Query<PendingQuery>, QueryRejection>,
) -> Result<Json<Vec<PendingAccount>>, AppError> {
    require_role(&caller, Role::Admin)?;
    let query = extract_query(query)?;
    let kind = query
        .kind
        .as_deref()
        .and_then(|k| k.trim().parse::<Role>().ok())
        .filter(|r| matches!(r, Role::Student | Role::Institution))
        .ok_or_else(|| AppError::Validation("type must be 'student' or 'institution'".into()))?;
    Ok(Json(state.registry.list_pending(kind)?))
}

/// GET /api/v1/admin/institutions: Active institutions.
#[utoipa::path(
    get,
    path = "/api/v1/admin/institutions",
    responses(
        (status = 200, description = "Active institutions", body = Vec<InstitutionListing>),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
async fn list_institutions(
    State(state): State<AppState>,
    caller: Principal,
) -> Result<Json<Vec<InstitutionListing>>, AppError> {
    require_role(&caller, Role::Admin)?;
    Ok(Json(state.registry.list_active_institutions()))
}

/// PUT /api/v1/admin/approve/:userId: Activate an account.
#[utoipa::path(
    put,
    path = "/api/v1/admin/approve/{userId}",
    params(("userId" = Uuid, Path, description = "Account to approve")),
    responses(
        (status = 200, description = "Approved, or already approved", body = ActionResponse),
        (status = 404, description = "No such account", body = crate::error::ErrorBody),
        (status = 409, description = "Account was rejected", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
async fn approve(
    State(state): State<AppState>,
    caller: Principal,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ActionResponse>, AppError> {
    require_role(&caller, Role::Admin)?;
    let target = extract_path(path)?;
    let outcome = state
        .registry
        .approve(UserId::from_uuid(target), caller.user_id)
        .await?;
    Ok(Json(ActionResponse::for_user(outcome.message(), target)))
}

/// PUT /api/v1/admin/reject/:userId: Reject an account.
#[utoipa::path(
    put,
    path = "/api/v1/admin/reject/{userId}",
    params(("userId" = Uuid, Path, description = "Account to reject")),
    responses(
        (status = 200, description = "Rejected, or already rejected", body = ActionResponse),
        (status = 404, description = "No such account", body = crate::error::ErrorBody),
        (status = 409, description = "Account is already active", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
async fn reject(
    State(state): State<AppState>,
    caller: Principal,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ActionResponse>, AppError> {
    require_role(&caller, Role::Admin)?;
    let target = extract_path(path)?;
    let outcome = state
        .registry
        .reject_user(UserId::from_uuid(target), caller.user_id)
        .await?;
    Ok(Json(ActionResponse::for_user(outcome.message(), target)))
}

/// PUT /api/v1/admin/permission/:userId: Grant or revoke issuance.
///
/// The id may be the institution's user id or its institution id.
#[utoipa::path(
    put,
    path = "/api/v1/admin/permission/{userId}",
    params(("userId" = Uuid, Path, description = "Institution user id or institution id")),
    request_body = PermissionRequest,
    responses(
        (status = 200, description = "Permission set", body = PermissionResponse),
        (status = 404, description = "No such institution", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
async fn set_permission(
    State(state): State<AppState>,
    caller: Principal,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<PermissionRequest>, JsonRejection>,
) -> Result<Json<PermissionResponse>, AppError> {
    require_role(&caller, Role::Admin)?;
    let target = extract_path(path)?;
    let req = extract_json(body)?;
    let outcome = state
        .registry
        .set_issuance_permission(target, req.can_issue)
        .await?;
    tracing::info!(
        institution = %target,
        can_issue = outcome.can_issue,
        admin = %caller.user_id,
        "issuance permission set"
    );
    Ok(Json(PermissionResponse {
        message: outcome.message().to_string(),
        can_issue: outcome.can_issue,
        changed: outcome.changed,
    }))
}

/// GET /api/v1/admin/profile-requests: Profile change requests.
#[utoipa::path(
    get,
    path = "/api/v1/admin/profile-requests",
    params(ProfileRequestQuery),
    responses(
        (status = 200, description = "Requests, newest first", body = Vec<ProfileRequestView>),
        (status = 422, description = "Unknown status", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
async fn list_profile_requests(
    State(state): State<AppState>,
    caller: Principal,
    query: Result<Query<ProfileRequestQuery>, QueryRejection>,
) -> Result<Json<Vec<ProfileRequestView>>, AppError> {
    require_role(&caller, Role::Admin)?;
    let query = extract_query(query)?;
    let status = query
        .status
        .as_deref()
        .map(|s| s.trim().parse::<ReviewStatus>())
        .transpose()?;
    Ok(Json(state.registry.list_profile_requests(status)))
}

/// PUT /api/v1/admin/profile-requests/:id: Approve or reject a request.
#[utoipa::path(
    put,
    path = "/api/v1/admin/profile-requests/{id}",
    params(("id" = Uuid, Path, description = "Profile request id")),
    request_body = ReviewRequest,
    responses(
        (status = 200, description = "Request decided", body = ProfileRequestView),
        (status = 404, description = "No such request", body = crate::error::ErrorBody),
        (status = 409, description = "Already decided, or identity now taken", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
async fn review_profile_request(
    State(state): State<AppState>,
    caller: Principal,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<ReviewRequest>, JsonRejection>,
) -> Result<Json<ProfileRequestView>, AppError> {
    require_role(&caller, Role::Admin)?;
    let id = ProfileRequestId::from_uuid(extract_path(path)?);
    let req = extract_json(body)?;
    let view = state
        .registry
        .review_profile_request(id, caller.user_id, req.decision, req.comment)
        .await?;
    Ok(Json(view))
}
