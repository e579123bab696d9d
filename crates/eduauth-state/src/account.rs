//! # Account Lifecycle
//!
//! ```text
//! Pending ──approve──▶ Active
//!    │
//!    └──reject───▶ Rejected
//! ```
//!
//! `approve` on an active account and `reject` on a rejected one are no-ops.
//! Moving between `Active` and `Rejected` is not permitted.

use std::str::FromStr;

use eduauth_core::ValidationError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Global lifecycle status of a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// Registered, awaiting admin review.
    Pending,
    /// Approved; may sign in.
    Active,
    /// Refused by an admin.
    Rejected,
}

impl AccountStatus {
    /// The wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Rejected => "rejected",
        }
    }

    /// Whether an account in this status may hold a session.
    pub fn can_sign_in(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Approve the account.
    pub fn approve(self) -> Result<Transition<Self>, AccountError> {
        match self {
            Self::Pending => Ok(Transition::Changed {
                from: self,
                to: Self::Active,
            }),
            Self::Active => Ok(Transition::Unchanged(self)),
            Self::Rejected => Err(AccountError::InvalidTransition {
                from: self,
                to: Self::Active,
            }),
        }
    }

    /// Reject the account.
    pub fn reject(self) -> Result<Transition<Self>, AccountError> {
        match self {
            Self::Pending => Ok(Transition::Changed {
                from: self,
                to: Self::Rejected,
            }),
            Self::Rejected => Ok(Transition::Unchanged(self)),
            Self::Active => Err(AccountError::InvalidTransition {
                from: self,
                to: Self::Rejected,
            }),
        }
    }
}

impl FromStr for AccountStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "rejected" => Ok(Self::Rejected),
            other => Err(ValidationError::UnknownVariant {
                kind: "account status",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an idempotent transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition<S> {
    /// The state moved.
    Changed {
        /// State before the transition.
        from: S,
        /// State after the transition.
        to: S,
    },
    /// The requested state already held; nothing to persist or announce.
    Unchanged(S),
}

impl<S: Copy> Transition<S> {
    /// The resulting state.
    pub fn state(&self) -> S {
        match self {
            Self::Changed { to, .. } => *to,
            Self::Unchanged(s) => *s,
        }
    }

    /// Whether anything changed.
    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Changed { .. })
    }
}

/// Rejected account transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccountError {
    /// The move is not part of the lifecycle.
    #[error("cannot move account from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: AccountStatus,
        /// Requested status.
        to: AccountStatus,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_approves_to_active() {
        let t = AccountStatus::Pending.approve().unwrap();
        assert!(t.is_changed());
        assert_eq!(t.state(), AccountStatus::Active);
    }

    #[test]
    fn approving_active_is_a_noop() {
        let t = AccountStatus::Active.approve().unwrap();
        assert_eq!(t, Transition::Unchanged(AccountStatus::Active));
        assert!(!t.is_changed());
    }

    #[test]
    fn rejected_cannot_be_approved() {
        let err = AccountStatus::Rejected.approve().unwrap_err();
        assert_eq!(err.to_string(), "cannot move account from rejected to active");
    }

    #[test]
    fn reject_paths() {
        assert_eq!(
            AccountStatus::Pending.reject().unwrap().state(),
            AccountStatus::Rejected
        );
        assert!(!AccountStatus::Rejected.reject().unwrap().is_changed());
        assert!(AccountStatus::Active.reject().is_err());
    }

    #[test]
    fn only_active_signs_in() {
        assert!(AccountStatus::Active.can_sign_in());
        assert!(!AccountStatus::Pending.can_sign_in());
        assert!(!AccountStatus::Rejected.can_sign_in());
    }

    #[test]
    fn string_forms() {
        for s in [
            AccountStatus::Pending,
            AccountStatus::Active,
            AccountStatus::Rejected,
        ] {
            assert_eq!(s.as_str().parse::<AccountStatus>().unwrap(), s);
            assert_eq!(
                serde_json::to_string(&s).unwrap(),
                format!("\"{}\"", s.as_str())
            );
        }
        assert!("suspended".parse::<AccountStatus>().is_err());
    }
}
