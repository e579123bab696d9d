//! # Application State & Configuration
//!
//! [`AppConfig`] is read once from the environment at startup.
//! [`AppState`] is the Axum router state: the registry handle plus the
//! session and blob stores. Every field is cheap to clone and shares its
//! interior with the other clones.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use zeroize::Zeroizing;

use crate::auth::SessionStore;
use crate::blobs::BlobStore;
use crate::middleware::rate_limit::RateLimitConfig;
use crate::registry::{Registry, DEFAULT_APP_BASE_URL};

/// Default session lifetime: 30 days.
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 720;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} has invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Application configuration.
///
/// Custom `Debug` redacts the database URL and admin password.
#[derive(Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: Option<String>,
    pub upload_dir: PathBuf,
    pub app_base_url: String,
    pub session_ttl_hours: i64,
    pub notify_webhook_url: Option<String>,
    pub admin_email: Option<String>,
    pub admin_password: Option<Zeroizing<String>>,
    pub log_format: LogFormat,
    pub rate_limit_max_requests: u64,
    pub rate_limit_window_secs: u64,
    pub rate_limit_trust_proxy: bool,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("upload_dir", &self.upload_dir)
            .field("app_base_url", &self.app_base_url)
            .field("session_ttl_hours", &self.session_ttl_hours)
            .field("notify_webhook_url", &self.notify_webhook_url)
            .field("admin_email", &self.admin_email)
            .field("admin_password", &self.admin_password.as_ref().map(|_| "[REDACTED]"))
            .field("log_format", &self.log_format)
            .field("rate_limit_max_requests", &self.rate_limit_max_requests)
            .field("rate_limit_window_secs", &self.rate_limit_window_secs)
            .field("rate_limit_trust_proxy", &self.rate_limit_trust_proxy)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let rate_limit = RateLimitConfig::default();
        Self {
            port: 8080,
            database_url: None,
            upload_dir: PathBuf::from("uploads"),
            app_base_url: DEFAULT_APP_BASE_URL.to_string(),
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            notify_webhook_url: None,
            admin_email: None,
            admin_password: None,
            log_format: LogFormat::Text,
            rate_limit_max_requests: rate_limit.max_requests,
            rate_limit_window_secs: rate_limit.window.as_secs(),
            rate_limit_trust_proxy: rate_limit.trust_forwarded_for,
        }
    }
}

fn positive_u64(var: &'static str, raw: Option<String>, default: u64) -> Result<u64, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        Ok(_) => Err(ConfigError::Invalid {
            var,
            value: raw,
            reason: "must be positive".into(),
        }),
        Err(e) => Err(ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value: raw,
        }),
    }
}

impl AppConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let port = match get("PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| ConfigError::Invalid {
                var: "PORT",
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => defaults.port,
        };
        let session_ttl_hours = match get("SESSION_TTL_HOURS") {
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(h) if h > 0 => h,
                Ok(_) => {
                    return Err(ConfigError::Invalid {
                        var: "SESSION_TTL_HOURS",
                        value: raw,
                        reason: "must be positive".into(),
                    })
                }
                Err(e) => {
                    return Err(ConfigError::Invalid {
                        var: "SESSION_TTL_HOURS",
                        value: raw.clone(),
                        reason: e.to_string(),
                    })
                }
            },
            None => defaults.session_ttl_hours,
        };
        let log_format = match get("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "LOG_FORMAT",
                    value: other.to_string(),
                    reason: "expected 'text' or 'json'".into(),
                })
            }
        };

        let rate_limit_max_requests = positive_u64(
            "RATE_LIMIT_MAX_REQUESTS",
            get("RATE_LIMIT_MAX_REQUESTS"),
            defaults.rate_limit_max_requests,
        )?;
        let rate_limit_window_secs = positive_u64(
            "RATE_LIMIT_WINDOW_SECS",
            get("RATE_LIMIT_WINDOW_SECS"),
            defaults.rate_limit_window_secs,
        )?;
        let rate_limit_trust_proxy = match get("RATE_LIMIT_TRUST_PROXY").as_deref().map(str::trim) {
            None => defaults.rate_limit_trust_proxy,
            Some("true" | "1") => true,
            Some("false" | "0") => false,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "RATE_LIMIT_TRUST_PROXY",
                    value: other.to_string(),
                    reason: "expected 'true' or 'false'".into(),
                })
            }
        };

        Ok(Self {
            port,
            database_url: get("DATABASE_URL"),
            upload_dir: get("UPLOAD_DIR").map(PathBuf::from).unwrap_or(defaults.upload_dir),
            app_base_url: get("APP_BASE_URL").unwrap_or(defaults.app_base_url),
            session_ttl_hours,
            notify_webhook_url: get("NOTIFY_WEBHOOK_URL"),
            admin_email: get("ADMIN_EMAIL"),
            admin_password: get("ADMIN_PASSWORD").map(Zeroizing::new),
            log_format,
            rate_limit_max_requests,
            rate_limit_window_secs,
            rate_limit_trust_proxy,
        })
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours)
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_requests: self.rate_limit_max_requests,
            window: Duration::from_secs(self.rate_limit_window_secs),
            trust_forwarded_for: self.rate_limit_trust_proxy,
        }
    }
}

/// Router state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub registry: Registry,
    pub sessions: SessionStore,
    pub blobs: BlobStore,
}

impl AppState {
    pub fn new(registry: Registry, sessions: SessionStore, blobs: BlobStore) -> Self {
        Self {
            registry,
            sessions,
            blobs,
        }
    }

    /// Everything in memory with default settings.
    pub fn in_memory() -> Self {
        Self::new(
            Registry::in_memory(),
            SessionStore::new(chrono::Duration::hours(DEFAULT_SESSION_TTL_HOURS)),
            BlobStore::in_memory(),
        )
    }
}
