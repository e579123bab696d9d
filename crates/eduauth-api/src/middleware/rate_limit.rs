//! # Per-Client Rate Limiting
//!
//! Fixed-window counter keyed by the peer address from [`ConnectInfo`].
//! The first `X-Forwarded-For` hop is used instead only when
//! [`RateLimitConfig::trust_forwarded_for`] is set, i.e. when the service
//! sits behind a proxy that overwrites the header.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use parking_lot::Mutex;

use crate::error::ErrorBody;

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: u64,
    /// Window duration.
    pub window: Duration,
    /// Key on the first `X-Forwarded-For` hop instead of the peer address.
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 1000,
            window: Duration::from_secs(60),
            trust_forwarded_for: false,
        }
    }
}

#[derive(Debug, Clone)]
struct BucketState {
    count: u64,
    window_start: Instant,
}

/// Shared rate limiter state.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Arc<Mutex<HashMap<String, BucketState>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Count a request from `key`. Returns false once the window is spent.
    fn check(&self, key: &str) -> bool {
        let mut buckets = self.buckets.lock();
        let now = Instant::now();
        let window = self.config.window;

        if buckets.len() > 10_000 {
            buckets.retain(|_, b| now.duration_since(b.window_start) < window);
        }

        let bucket = buckets.entry(key.to_string()).or_insert(BucketState {
            count: 0,
            window_start: now,
        });

        if now.duration_since(bucket.window_start) >= window {
            bucket.count = 0;
            bucket.window_start = now;
        }

        if bucket.count >= self.config.max_requests {
            false
        } else {
            bucket.count += 1;
            true
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

fn forwarded_for(request: &Request) -> Option<String> {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// The bucket a request counts against. Requests with no peer address
/// (only possible when the router is driven without a listener) share
/// the `"unknown"` bucket.
fn client_key(request: &Request, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        if let Some(hop) = forwarded_for(request) {
            return hop;
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware that enforces per-client rate limits.
pub async fn rate_limit_middleware(request: Request, next: Next) -> Response {
    let limiter = request.extensions().get::<RateLimiter>().cloned();

    if let Some(limiter) = limiter {
        let key = client_key(&request, limiter.config.trust_forwarded_for);
        if !limiter.check(&key) {
            tracing::warn!(client = %key, "rate limit exceeded");
            let body = ErrorBody::new("RATE_LIMITED", "rate limit exceeded");
            return (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        }
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::{Extension, Router};
    use tower::ServiceExt;

    fn test_app(max_requests: u64, trust_forwarded_for: bool) -> Router {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests,
            window: Duration::from_secs(60),
            trust_forwarded_for,
        });
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(from_fn(rate_limit_middleware))
            .layer(Extension(limiter))
    }

    async fn status_for(app: &Router, peer: &str, forwarded: Option<&str>) -> StatusCode {
        let mut builder = axum::http::Request::builder().uri("/");
        if let Some(ip) = forwarded {
            builder = builder.header("x-forwarded-for", ip);
        }
        let mut req = builder.body(Body::empty()).unwrap();
        let addr: SocketAddr = format!("{peer}:40000").parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        app.clone().oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn limits_per_peer_address() {
        let app = test_app(2, false);
        assert_eq!(status_for(&app, "10.0.0.1", None).await, StatusCode::OK);
        assert_eq!(status_for(&app, "10.0.0.1", None).await, StatusCode::OK);
        assert_eq!(
            status_for(&app, "10.0.0.1", None).await,
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(status_for(&app, "10.0.0.2", None).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn rotating_forwarded_for_does_not_reset_an_untrusted_peer() {
        let app = test_app(1, false);
        assert_eq!(status_for(&app, "10.0.0.1", Some("1.1.1.1")).await, StatusCode::OK);
        assert_eq!(
            status_for(&app, "10.0.0.1", Some("2.2.2.2")).await,
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[tokio::test]
    async fn trusted_proxy_keys_on_first_forwarded_hop() {
        let app = test_app(1, true);
        let proxy = "192.168.0.10";
        assert_eq!(
            status_for(&app, proxy, Some("10.0.0.1, 172.16.0.1")).await,
            StatusCode::OK
        );
        assert_eq!(
            status_for(&app, proxy, Some("10.0.0.1")).await,
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(status_for(&app, proxy, Some("10.0.0.2")).await, StatusCode::OK);
        // No header behind the proxy falls back to the peer address.
        assert_eq!(status_for(&app, proxy, None).await, StatusCode::OK);
    }

    #[test]
    fn window_resets() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 1,
            window: Duration::from_millis(0),
            trust_forwarded_for: false,
        });
        assert!(limiter.check("k"));
        assert!(limiter.check("k"));
    }
}
