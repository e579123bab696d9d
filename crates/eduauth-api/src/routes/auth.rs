//! # Account Endpoints
//!
//! Self-registration for students and institutions, password login issuing
//! a bearer session, logout, and the live principal.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use eduauth_core::Role;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use zeroize::Zeroizing;

use super::ActionResponse;
use crate::auth::SessionToken;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, Validate};
use crate::registry::{
    InstitutionRegistration, Principal, RegisteredAccount, Registration, StudentRegistration,
};
use crate::state::AppState;

/// Registration form. Which fields are required depends on `role`.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// "student" or "institution".
    pub role: String,
    pub email: String,
    #[schema(format = Password)]
    pub password: String,
    pub full_name: Option<String>,
    /// YYYY-MM-DD.
    pub date_of_birth: Option<String>,
    /// "nid" (default) or "birth_certificate".
    pub identity_type: Option<String>,
    pub identity_number: Option<String>,
    /// Path returned by the upload endpoint.
    #[serde(alias = "photo")]
    pub photo_path: Option<String>,
    pub institution_name: Option<String>,
    pub institution_type: Option<String>,
    pub registration_number: Option<String>,
}

impl RegisterRequest {
    fn into_registration(self) -> Result<Registration, AppError> {
        let password = Zeroizing::new(self.password);
        match self.role.trim().parse::<Role>() {
            Ok(Role::Student) => Ok(Registration::Student(StudentRegistration {
                email: self.email,
                password,
                full_name: self.full_name,
                date_of_birth: self.date_of_birth,
                identity_type: self.identity_type,
                identity_number: self.identity_number,
                photo_path: self.photo_path,
            })),
            Ok(Role::Institution) => Ok(Registration::Institution(InstitutionRegistration {
                email: self.email,
                password,
                institution_name: self.institution_name,
                institution_type: self.institution_type,
                registration_number: self.registration_number,
            })),
            _ => Err(AppError::Validation(
                "role must be 'student' or 'institution'".into(),
            )),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    #[schema(format = Password)]
    pub password: String,
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), String> {
        if self.email.trim().is_empty() || self.password.is_empty() {
            return Err("email and password are required".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Send as `Authorization: Bearer {token}`.
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: Principal,
}

/// Build the auth router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/auth/register", post(register))
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/auth/logout", post(logout))
        .route("/api/v1/auth/me", get(me))
}

/// POST /api/v1/auth/register: Create a pending account.
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, pending approval", body = RegisteredAccount),
        (status = 409, description = "Email or identity number taken", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid registration", body = crate::error::ErrorBody),
    ),
    tag = "auth"
)]
async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisteredAccount>), AppError> {
    let registration = extract_json(body)?.into_registration()?;
    let account = state.registry.register(registration).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

/// POST /api/v1/auth/login: Exchange credentials for a session.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorBody),
        (status = 403, description = "Account not active", body = crate::error::ErrorBody),
    ),
    tag = "auth"
)]
async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let req = extract_validated_json(body)?;
    let principal = match state
        .registry
        .authenticate(&req.email, Zeroizing::new(req.password))
        .await
    {
        Ok(principal) => principal,
        Err(e) => {
            tracing::warn!(reason = %e, "login rejected");
            return Err(e.into());
        }
    };
    let session = state.sessions.issue(principal.user_id);
    tracing::info!(user_id = %principal.user_id, role = %principal.role, "signed in");
    Ok(Json(LoginResponse {
        token: session.token.as_str().to_string(),
        expires_at: session.expires_at,
        user: principal,
    }))
}

/// POST /api/v1/auth/logout: End the current session.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    responses(
        (status = 200, description = "Signed out", body = ActionResponse),
        (status = 401, description = "No session", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
async fn logout(
    State(state): State<AppState>,
    caller: Principal,
    token: SessionToken,
) -> Result<Json<ActionResponse>, AppError> {
    state.sessions.revoke(token.as_str());
    tracing::info!(user_id = %caller.user_id, "signed out");
    Ok(Json(ActionResponse::new("signed out")))
}

/// GET /api/v1/auth/me: The live principal.
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Current principal", body = Principal),
        (status = 401, description = "No session", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
async fn me(caller: Principal) -> Json<Principal> {
    Json(caller)
}
