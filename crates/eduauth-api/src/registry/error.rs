//! Registry error taxonomy.
//!
//! Every write path returns one of these. The HTTP boundary maps each kind to
//! a status code; only `Persistence` hides its message from the client.

use eduauth_core::{CanonicalizationError, ValidationError};
use eduauth_state::{AccountError, ReviewError};
use thiserror::Error;

/// A failed registry operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Missing or malformed input.
    #[error("{0}")]
    Validation(String),

    /// Bad or expired credential.
    #[error("{0}")]
    Authentication(String),

    /// Authenticated but not allowed.
    #[error("{0}")]
    Authorization(String),

    /// No such record.
    #[error("{0}")]
    NotFound(String),

    /// The operation collides with existing state.
    #[error("{0}")]
    Conflict(String),

    /// Storage failure. The transaction has been rolled back.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl RegistryError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub(crate) fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub(crate) fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub(crate) fn forbidden(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }
}

impl From<ValidationError> for RegistryError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<AccountError> for RegistryError {
    fn from(err: AccountError) -> Self {
        Self::Conflict(err.to_string())
    }
}

impl From<ReviewError> for RegistryError {
    fn from(err: ReviewError) -> Self {
        Self::Conflict(err.to_string())
    }
}

impl From<CanonicalizationError> for RegistryError {
    fn from(err: CanonicalizationError) -> Self {
        Self::Persistence(err.to_string())
    }
}
