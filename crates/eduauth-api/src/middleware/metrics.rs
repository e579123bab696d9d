//! # Request Metrics
//!
//! In-process atomic counters. Server errors are counted apart from client
//! errors so that a flood of rejected logins does not look like an outage.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

/// Shared metrics state.
#[derive(Debug, Clone, Default)]
pub struct ApiMetrics {
    pub request_count: Arc<AtomicU64>,
    pub client_error_count: Arc<AtomicU64>,
    pub server_error_count: Arc<AtomicU64>,
}

impl ApiMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn client_errors(&self) -> u64 {
        self.client_error_count.load(Ordering::Relaxed)
    }

    pub fn server_errors(&self) -> u64 {
        self.server_error_count.load(Ordering::Relaxed)
    }
}

/// Middleware that increments request and error counters.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let metrics = request.extensions().get::<ApiMetrics>().cloned();

    let response = next.run(request).await;

    if let Some(m) = metrics {
        m.request_count.fetch_add(1, Ordering::Relaxed);
        let status = response.status();
        if status.is_server_error() {
            m.server_error_count.fetch_add(1, Ordering::Relaxed);
        } else if status.is_client_error() {
            m.client_error_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::{Extension, Router};
    use tower::ServiceExt;

    #[tokio::test]
    async fn counts_requests_and_errors_separately() {
        let metrics = ApiMetrics::new();
        let app = Router::new()
            .route("/ok", get(|| async { "ok" }))
            .route("/bad", get(|| async { StatusCode::UNPROCESSABLE_ENTITY }))
            .route("/boom", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .layer(from_fn(metrics_middleware))
            .layer(Extension(metrics.clone()));

        for uri in ["/ok", "/bad", "/boom", "/ok"] {
            let request = axum::http::Request::builder()
                .uri(uri)
                .body(Body::empty())
                .unwrap();
            app.clone().oneshot(request).await.unwrap();
        }

        assert_eq!(metrics.requests(), 4);
        assert_eq!(metrics.client_errors(), 1);
        assert_eq!(metrics.server_errors(), 1);
    }
}
