//! Small helpers for turning optional request fields into checked values.

use eduauth_core::ValidationError;

/// Trimmed, non-blank value of a required field.
pub(crate) fn required(field: &'static str, value: Option<&str>) -> Result<String, ValidationError> {
    optional(value).ok_or(ValidationError::MissingField { field })
}

/// Trimmed value, with blank treated as absent.
pub(crate) fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Reject values longer than `max` characters.
pub(crate) fn bounded(field: &'static str, value: String, max: usize) -> Result<String, ValidationError> {
    if value.chars().count() > max {
        Err(ValidationError::TooLong { field, max })
    } else {
        Ok(value)
    }
}
