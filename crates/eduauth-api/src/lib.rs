//! # eduauth-api: EduAuth Registry Service
//!
//! Students and institutions register and wait for admin approval.
//! Approved institutions enroll students by identity number and, once an
//! admin grants issuance permission, issue certificates that anyone can
//! verify by fingerprint. Students change identity attributes only through
//! admin-reviewed profile requests.
//!
//! ## API Surface
//!
//! | Prefix                     | Module                      | Access        |
//! |----------------------------|-----------------------------|---------------|
//! | `/api/v1/auth/*`           | [`routes::auth`]            | public / any  |
//! | `/api/v1/uploads`          | [`routes::uploads`]         | public        |
//! | `/api/v1/admin/*`          | [`routes::admin`]           | admin         |
//! | `/api/v1/institution/*`    | [`routes::institution`]     | institution   |
//! | `/api/v1/certificates/*`   | [`routes::certificates`]    | institution / student |
//! | `/api/v1/students/me/*`    | [`routes::students`]        | student       |
//! | `/api/v1/verify/*`         | [`routes::verify`]          | public        |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AuthMiddleware → RateLimitMiddleware → Handler
//! ```
//!
//! The auth middleware only resolves a bearer session when one is sent.
//! Handlers that need a caller take a [`registry::Principal`] argument,
//! which rejects with 401 when none was resolved.

pub mod auth;
pub mod blobs;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod notify;
pub mod openapi;
pub mod password;
pub mod registry;
pub mod routes;
pub mod state;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::blobs::PUBLIC_PREFIX;
use crate::middleware::metrics::ApiMetrics;
use crate::middleware::rate_limit::{RateLimitConfig, RateLimiter};
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
pub fn app(state: AppState) -> Router {
    app_with_rate_limit(state, RateLimitConfig::default())
}

/// [`app`] with an explicit rate limit.
pub fn app_with_rate_limit(state: AppState, rate_limit: RateLimitConfig) -> Router {
    let metrics = ApiMetrics::new();
    let limiter = RateLimiter::new(rate_limit);
    let upload_root = state.blobs.root().map(|p| p.to_path_buf());

    let api = Router::new()
        .route("/api/v1", get(root))
        .route("/api/v1/", get(root))
        .merge(routes::auth::router())
        .merge(routes::uploads::router())
        .merge(routes::admin::router())
        .merge(routes::institution::router())
        .merge(routes::certificates::router())
        .merge(routes::students::router())
        .merge(routes::verify::router())
        .merge(openapi::router())
        .layer(from_fn(middleware::rate_limit::rate_limit_middleware))
        .layer(from_fn_with_state(state.clone(), auth::auth_middleware))
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(axum::Extension(metrics))
        .layer(axum::Extension(limiter))
        .with_state(state);

    // Unauthenticated health probes.
    let health = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness));

    let mut router = Router::new().merge(health).merge(api);
    if let Some(root) = upload_root {
        router = router.nest_service(PUBLIC_PREFIX, ServeDir::new(root));
    }
    router
}

/// GET /api/v1: Service banner.
async fn root() -> Json<Value> {
    Json(json!({ "status": "active", "system": "EduAuth Registry API" }))
}

/// Liveness probe: always returns 200 if the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: returns 200 when the application is ready to serve.
async fn readiness() -> &'static str {
    "ready"
}
