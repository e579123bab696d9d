//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI spec,
//! served at `/api/v1/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

/// Assembled OpenAPI spec for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "EduAuth Registry API",
        version = "0.1.0",
        description = "Account approval, enrollment-gated certificate issuance, profile change review, and public certificate verification.",
        license(name = "AGPL-3.0-or-later")
    ),
    paths(
        // Auth
        crate::routes::auth::register,
        crate::routes::auth::login,
        crate::routes::auth::logout,
        crate::routes::auth::me,
        // Uploads
        crate::routes::uploads::upload,
        // Admin
        crate::routes::admin::list_pending,
        crate::routes::admin::list_institutions,
        crate::routes::admin::approve,
        crate::routes::admin::reject,
        crate::routes::admin::set_permission,
        crate::routes::admin::list_profile_requests,
        crate::routes::admin::review_profile_request,
        // Institution
        crate::routes::institution::enroll,
        crate::routes::institution::list_students,
        // Certificates
        crate::routes::certificates::issue,
        crate::routes::certificates::my_certificates,
        // Students
        crate::routes::students::list_own_certificates,
        crate::routes::students::my_profile,
        crate::routes::students::update_contact,
        crate::routes::students::submit_profile_request,
        // Verification
        crate::routes::verify::verify_certificate,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::routes::ActionResponse,
        crate::routes::auth::RegisterRequest,
        crate::routes::auth::LoginRequest,
        crate::routes::auth::LoginResponse,
        crate::routes::uploads::UploadForm,
        crate::routes::uploads::UploadResponse,
        crate::routes::admin::PermissionRequest,
        crate::routes::admin::PermissionResponse,
        crate::routes::admin::ReviewRequest,
        crate::routes::institution::EnrollRequest,
        crate::routes::certificates::IssueCertificateRequest,
        crate::routes::students::ContactRequest,
        crate::routes::students::ProfileChangeRequest,
        crate::registry::RegisteredAccount,
        crate::registry::Principal,
        crate::registry::PendingAccount,
        crate::registry::InstitutionListing,
        crate::registry::EnrolledStudent,
        crate::registry::IssuedCertificate,
        crate::registry::CertificateSummary,
        crate::registry::OwnCertificate,
        crate::registry::ProposedChanges,
        crate::registry::ProfileRequestView,
        crate::registry::StudentProfileView,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Registration and sessions"),
        (name = "uploads", description = "Photo and document uploads"),
        (name = "admin", description = "Approval, issuance permission, profile review"),
        (name = "institution", description = "Enrollment roster"),
        (name = "certificates", description = "Certificate issuance"),
        (name = "students", description = "Student self-service"),
        (name = "verification", description = "Public certificate lookup"),
    )
)]
pub struct ApiDoc;

/// Registers the `bearer` security scheme referenced by protected paths.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

/// Build the OpenAPI router.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/v1/openapi.json", get(openapi_json))
}

/// GET /api/v1/openapi.json: Return the generated OpenAPI specification.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_lists_every_route() {
        let spec = ApiDoc::openapi();
        let paths: Vec<&String> = spec.paths.paths.keys().collect();
        for expected in [
            "/api/v1/auth/register",
            "/api/v1/auth/login",
            "/api/v1/admin/approve/{userId}",
            "/api/v1/institution/enroll",
            "/api/v1/certificates/issue",
            "/api/v1/students/me/profile-request",
            "/api/v1/verify/{fingerprint}",
        ] {
            assert!(
                paths.iter().any(|p| p.as_str() == expected),
                "missing path {expected}"
            );
        }
    }

    #[test]
    fn bearer_scheme_is_registered() {
        let spec = ApiDoc::openapi();
        let components = spec.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer"));
    }

    #[test]
    fn spec_serializes_to_json() {
        let json = serde_json::to_value(ApiDoc::openapi()).unwrap();
        assert_eq!(json["info"]["title"], "EduAuth Registry API");
    }
}
