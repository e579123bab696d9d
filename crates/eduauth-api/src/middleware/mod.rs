//! # HTTP Middleware
//!
//! Request counting and per-client rate limiting. Tracing is the stock
//! `tower_http::trace::TraceLayer`, applied in [`crate::app`].

pub mod metrics;
pub mod rate_limit;
