//! # Sessions & Authentication Middleware
//!
//! ## Token Format
//!
//! ```text
//! Bearer {session_id}.{secret}
//! ```
//!
//! `session_id` is a UUID; `secret` is 32 random bytes, hex-encoded. Only the
//! SHA-256 digest of the secret is kept server-side and it is compared in
//! constant time.
//!
//! ## Principal
//!
//! The middleware resolves a valid session to a live
//! [`Principal`] on every request, re-reading account status from the
//! registry. Requests without an `Authorization` header pass through with no
//! principal; handlers that need one extract it and get a 401 otherwise.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Duration, Utc};
use eduauth_core::{sha256_raw, Clock, Role, SystemClock, UserId};
use parking_lot::RwLock;
use rand_core::{OsRng, RngCore};
use subtle::ConstantTimeEq;
use thiserror::Error;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::error::AppError;
use crate::registry::Principal;
use crate::state::AppState;

// ── Session Token ───────────────────────────────────────────────────────────

/// A bearer token as handed to the client.
///
/// Custom `Debug` redacts the value to prevent credential leakage in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(Zeroizing<String>);

impl SessionToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(Zeroizing::new(raw.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken([REDACTED])")
    }
}

/// The caller's own token, for logout.
#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for SessionToken {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionToken>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("authentication required".into()))
    }
}

// ── Session Store ───────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    #[error("invalid session token")]
    Invalid,
    #[error("session expired")]
    Expired,
}

#[derive(Debug, Clone)]
struct SessionEntry {
    user_id: UserId,
    secret_digest: [u8; 32],
    expires_at: DateTime<Utc>,
}

/// A freshly issued session.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: SessionToken,
    pub expires_at: DateTime<Utc>,
}

/// In-memory session table. Sessions do not survive a restart.
#[derive(Debug, Clone)]
pub struct SessionStore {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    sessions: Arc<RwLock<HashMap<Uuid, SessionEntry>>>,
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Constant-time comparison of secret digests.
fn constant_time_digest_eq(provided: &[u8; 32], expected: &[u8; 32]) -> bool {
    provided.ct_eq(expected).into()
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            clock: Arc::new(SystemClock::new()),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Open a session for `user_id`. Expired sessions are pruned on the way.
    pub fn issue(&self, user_id: UserId) -> IssuedSession {
        let now = self.clock.now();
        let mut secret = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut secret[..]);
        let secret_hex = Zeroizing::new(hex(&secret[..]));

        let session_id = Uuid::new_v4();
        let expires_at = now + self.ttl;
        let entry = SessionEntry {
            user_id,
            secret_digest: sha256_raw(secret_hex.as_bytes()).bytes,
            expires_at,
        };

        let mut sessions = self.sessions.write();
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(session_id, entry);

        IssuedSession {
            token: SessionToken::new(format!("{session_id}.{}", secret_hex.as_str())),
            expires_at,
        }
    }

    fn lookup(&self, token: &str) -> Result<(Uuid, SessionEntry), SessionError> {
        let (id, secret) = token.split_once('.').ok_or(SessionError::Invalid)?;
        let id: Uuid = id.parse().map_err(|_| SessionError::Invalid)?;
        let entry = self
            .sessions
            .read()
            .get(&id)
            .cloned()
            .ok_or(SessionError::Invalid)?;
        let digest = sha256_raw(secret.as_bytes()).bytes;
        if !constant_time_digest_eq(&digest, &entry.secret_digest) {
            return Err(SessionError::Invalid);
        }
        Ok((id, entry))
    }

    /// The user a token belongs to.
    pub fn resolve(&self, token: &str) -> Result<UserId, SessionError> {
        let (id, entry) = self.lookup(token)?;
        if entry.expires_at <= self.clock.now() {
            self.sessions.write().remove(&id);
            return Err(SessionError::Expired);
        }
        Ok(entry.user_id)
    }

    /// End a session. Returns whether one was removed.
    pub fn revoke(&self, token: &str) -> bool {
        match self.lookup(token) {
            Ok((id, _)) => self.sessions.write().remove(&id).is_some(),
            Err(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Principal Extraction ────────────────────────────────────────────────────

/// Extracts the principal that the auth middleware injected into extensions.
/// Returns 401 if the request carried no valid session.
#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for Principal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("authentication required".into()))
    }
}

/// Check that the caller holds `role`. Returns 403 otherwise.
pub fn require_role(caller: &Principal, role: Role) -> Result<(), AppError> {
    if caller.role == role {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role '{}' required, caller has '{}'",
            role.as_str(),
            caller.role.as_str()
        )))
    }
}

// ── Middleware ──────────────────────────────────────────────────────────────

/// The bearer token, if an `Authorization` header is present.
fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, &'static str> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| "authorization header is not valid text")?;
    value
        .strip_prefix("Bearer ")
        .map(|t| Some(t.trim()))
        .ok_or("authorization header must use Bearer scheme")
}

/// Resolve the bearer session and inject the live [`Principal`].
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match bearer_token(request.headers()) {
        Ok(None) => return next.run(request).await,
        Ok(Some(token)) => token.to_string(),
        Err(msg) => {
            tracing::warn!(reason = msg, "authentication failed");
            return AppError::Unauthorized(msg.into()).into_response();
        }
    };

    let user_id = match state.sessions.resolve(&token) {
        Ok(user_id) => user_id,
        Err(e) => {
            tracing::warn!(reason = %e, "authentication failed");
            return AppError::Unauthorized(e.to_string()).into_response();
        }
    };

    match state.registry.resolve_principal(user_id) {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            request.extensions_mut().insert(SessionToken::new(token));
            next.run(request).await
        }
        Err(e) => {
            tracing::warn!(%user_id, reason = %e, "session principal rejected");
            AppError::from(e).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::middleware::from_fn_with_state;
    use axum::routing::get;
    use axum::Router;
    use eduauth_core::ManualClock;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn store() -> (SessionStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = SessionStore::new(Duration::hours(1)).with_clock(clock.clone());
        (store, clock)
    }

    #[test]
    fn issued_token_resolves_to_its_user() {
        let (store, _) = store();
        let user = UserId::new();
        let session = store.issue(user);
        assert_eq!(store.resolve(session.token.as_str()), Ok(user));
    }

    #[test]
    fn tampered_secret_is_rejected() {
        let (store, _) = store();
        let session = store.issue(UserId::new());
        let (id, secret) = session.token.as_str().split_once('.').unwrap();
        let flipped: String = secret
            .chars()
            .map(|c| if c == '0' { '1' } else { '0' })
            .collect();
        assert_eq!(
            store.resolve(&format!("{id}.{flipped}")),
            Err(SessionError::Invalid)
        );
        assert_eq!(store.resolve("garbage"), Err(SessionError::Invalid));
        assert_eq!(store.resolve("not-a-uuid.abc"), Err(SessionError::Invalid));
    }

    #[test]
    fn sessions_expire_after_ttl() {
        let (store, clock) = store();
        let session = store.issue(UserId::new());
        clock.advance(Duration::minutes(59));
        assert!(store.resolve(session.token.as_str()).is_ok());
        clock.advance(Duration::minutes(2));
        assert_eq!(store.resolve(session.token.as_str()), Err(SessionError::Expired));
        assert!(store.is_empty());
    }

    #[test]
    fn revoke_ends_only_that_session() {
        let (store, _) = store();
        let user = UserId::new();
        let a = store.issue(user);
        let b = store.issue(user);
        assert!(store.revoke(a.token.as_str()));
        assert!(!store.revoke(a.token.as_str()));
        assert_eq!(store.resolve(a.token.as_str()), Err(SessionError::Invalid));
        assert_eq!(store.resolve(b.token.as_str()), Ok(user));
    }

    #[test]
    fn token_debug_is_redacted() {
        let (store, _) = store();
        let session = store.issue(UserId::new());
        let rendered = format!("{:?}", session.token);
        assert!(!rendered.contains(session.token.as_str()));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn bearer_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), Ok(None));
        headers.insert(header::AUTHORIZATION, "Bearer abc.def".parse().unwrap());
        assert_eq!(bearer_token(&headers), Ok(Some("abc.def")));
        headers.insert(header::AUTHORIZATION, "Basic dXNlcjpwYXNz".parse().unwrap());
        assert!(bearer_token(&headers).is_err());
    }

    fn test_app(state: AppState) -> Router {
        Router::new()
            .route("/open", get(|| async { "ok" }))
            .route(
                "/whoami",
                get(|p: Principal| async move { p.email.to_string() }),
            )
            .layer(from_fn_with_state(state.clone(), auth_middleware))
            .with_state(state)
    }

    async fn call(app: Router, uri: &str, token: Option<&str>) -> (StatusCode, String) {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let response = app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    #[tokio::test]
    async fn anonymous_requests_reach_open_routes_only() {
        let app = test_app(AppState::in_memory());
        assert_eq!(call(app.clone(), "/open", None).await.0, StatusCode::OK);
        let (status, body) = call(app, "/whoami", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("authentication required"));
    }

    #[tokio::test]
    async fn valid_session_injects_live_principal() {
        let state = AppState::in_memory();
        let admin = match state
            .registry
            .seed_admin("root@eduauth.test", "admin-password")
            .await
            .unwrap()
        {
            crate::registry::SeedOutcome::Created(id) => id,
            crate::registry::SeedOutcome::AlreadyExists(id) => id,
        };
        let session = state.sessions.issue(admin);
        let (status, body) = call(test_app(state), "/whoami", Some(session.token.as_str())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "root@eduauth.test");
    }

    #[tokio::test]
    async fn unknown_token_is_unauthorized() {
        let app = test_app(AppState::in_memory());
        let token = format!("{}.{}", Uuid::new_v4(), "ab".repeat(32));
        let (status, body) = call(app.clone(), "/open", Some(&token)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("invalid session token"));
    }

    #[tokio::test]
    async fn session_of_deleted_account_is_unauthorized() {
        let state = AppState::in_memory();
        let session = state.sessions.issue(UserId::new());
        let (status, _) = call(test_app(state), "/whoami", Some(session.token.as_str())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
