//! # Custom Extractors & Validation
//!
//! Extractor results are taken as `Result<_, Rejection>` so that malformed
//! input becomes a 400 in the standard error shape instead of axum's plain
//! text rejection.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query};
use axum::Json;

use crate::error::AppError;

/// Request shape checks beyond what serde enforces. Business rules stay in
/// the registry.
pub trait Validate {
    /// Returns an error message on failure.
    fn validate(&self) -> Result<(), String>;
}

/// Extract a JSON body, mapping deserialization errors to [`AppError::BadRequest`].
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Extract a JSON body and validate it using the [`Validate`] trait.
pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    let value = extract_json(result)?;
    value.validate().map_err(AppError::Validation)?;
    Ok(value)
}

pub fn extract_query<T>(result: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    result
        .map(|Query(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

pub fn extract_path<T>(result: Result<Path<T>, PathRejection>) -> Result<T, AppError> {
    result
        .map(|Path(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}
