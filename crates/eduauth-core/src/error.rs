//! # Error Types
//!
//! Structured errors for the foundational layer, built with `thiserror`.

use thiserror::Error;

/// Domain primitive validation failures.
///
/// Every message is safe to hand back to the caller verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field was absent or blank.
    #[error("{field} is required")]
    MissingField {
        /// The wire name of the field.
        field: &'static str,
    },

    /// The email address could not be normalized into a usable form.
    #[error("invalid email address: {0}")]
    InvalidEmail(String),

    /// A calendar date was not in `YYYY-MM-DD` form.
    #[error("{field} must be a date in YYYY-MM-DD form, got {value:?}")]
    InvalidDate {
        /// The wire name of the field.
        field: &'static str,
        /// The rejected input.
        value: String,
    },

    /// A string did not name a member of a closed set.
    #[error("unknown {kind}: {value:?}")]
    UnknownVariant {
        /// Which closed set was being parsed.
        kind: &'static str,
        /// The rejected input.
        value: String,
    },

    /// A field exceeded its maximum length.
    #[error("{field} must be at most {max} characters")]
    TooLong {
        /// The wire name of the field.
        field: &'static str,
        /// Maximum permitted length in characters.
        max: usize,
    },

    /// A field had to change but was resubmitted with its current value.
    #[error("{field} must differ from the current value")]
    Unchanged {
        /// The wire name of the field.
        field: &'static str,
    },

    /// A stored fingerprint was not 64 lowercase hex characters.
    #[error("malformed fingerprint: {0:?}")]
    MalformedFingerprint(String),
}

/// Errors during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Float values have no single canonical text form.
    #[error("float values are not permitted in canonical representations: {0}")]
    FloatRejected(f64),

    /// JSON serialization failed during canonicalization.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_names_the_field() {
        let err = ValidationError::MissingField { field: "fullName" };
        assert_eq!(err.to_string(), "fullName is required");
    }

    #[test]
    fn unknown_variant_quotes_input() {
        let err = ValidationError::UnknownVariant {
            kind: "role",
            value: "superuser".into(),
        };
        assert!(err.to_string().contains("\"superuser\""));
    }

    #[test]
    fn float_rejection_carries_value() {
        let err = CanonicalizationError::FloatRejected(3.5);
        assert!(err.to_string().contains("3.5"));
    }
}
