//! # Profile Change-Request Review
//!
//! ```text
//! Pending ──approve──▶ Approved (terminal)
//!    │
//!    └──reject───▶ Rejected (terminal)
//! ```
//!
//! A terminal request can never be decided again.

use std::str::FromStr;

use eduauth_core::ValidationError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Review status of a change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    /// Awaiting an admin decision.
    Pending,
    /// Accepted; the proposed fields were applied.
    Approved,
    /// Refused; nothing was applied.
    Rejected,
}

/// An admin's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    /// Apply the proposal.
    #[serde(alias = "approved")]
    Approve,
    /// Discard the proposal.
    #[serde(alias = "rejected")]
    Reject,
}

impl ReviewStatus {
    /// The wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Whether the request has been decided.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Apply a decision.
    pub fn decide(self, decision: ReviewDecision) -> Result<Self, ReviewError> {
        if self.is_terminal() {
            return Err(ReviewError::AlreadyReviewed { status: self });
        }
        Ok(match decision {
            ReviewDecision::Approve => Self::Approved,
            ReviewDecision::Reject => Self::Rejected,
        })
    }
}

impl FromStr for ReviewStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(ValidationError::UnknownVariant {
                kind: "review status",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected review transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReviewError {
    /// The request already carries a decision.
    #[error("profile request has already been {status}")]
    AlreadyReviewed {
        /// The terminal status it holds.
        status: ReviewStatus,
    },
}

/// A field a student may propose to change through review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProfileField {
    /// Legal name.
    FullName,
    /// Date of birth.
    DateOfBirth,
    /// Identity document type.
    IdentityType,
    /// Identity document number (stored only as a fingerprint).
    IdentityNumber,
    /// Profile photo.
    Photo,
}

impl ProfileField {
    /// Whether changing this field alters who the student legally is.
    ///
    /// Identity fields need a proof document and re-stamp the identity as
    /// verified on approval. The photo does neither.
    pub fn is_identity_field(&self) -> bool {
        !matches!(self, Self::Photo)
    }
}

/// Whether any of `fields` is an identity field.
pub fn touches_identity(fields: &[ProfileField]) -> bool {
    fields.iter().any(ProfileField::is_identity_field)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_can_be_decided_once() {
        let approved = ReviewStatus::Pending.decide(ReviewDecision::Approve).unwrap();
        assert_eq!(approved, ReviewStatus::Approved);
        assert_eq!(
            approved.decide(ReviewDecision::Reject),
            Err(ReviewError::AlreadyReviewed {
                status: ReviewStatus::Approved
            })
        );
    }

    #[test]
    fn rejected_is_terminal_too() {
        let rejected = ReviewStatus::Pending.decide(ReviewDecision::Reject).unwrap();
        assert!(rejected.is_terminal());
        let err = rejected.decide(ReviewDecision::Approve).unwrap_err();
        assert_eq!(err.to_string(), "profile request has already been rejected");
    }

    #[test]
    fn decisions_accept_past_tense_aliases() {
        let d: ReviewDecision = serde_json::from_str("\"approved\"").unwrap();
        assert_eq!(d, ReviewDecision::Approve);
        let d: ReviewDecision = serde_json::from_str("\"reject\"").unwrap();
        assert_eq!(d, ReviewDecision::Reject);
    }

    #[test]
    fn photo_alone_does_not_touch_identity() {
        assert!(!touches_identity(&[ProfileField::Photo]));
        assert!(!touches_identity(&[]));
        assert!(touches_identity(&[ProfileField::Photo, ProfileField::DateOfBirth]));
        assert!(touches_identity(&[ProfileField::IdentityType]));
    }

    #[test]
    fn field_wire_names() {
        assert_eq!(
            serde_json::to_string(&ProfileField::IdentityNumber).unwrap(),
            "\"identityNumber\""
        );
    }
}
