//! # Institution Standing
//!
//! An institution's standing has three parts:
//!
//! - the owning user's [`AccountStatus`],
//! - the nested [`ApprovalStatus`], set together with the account on approval,
//! - `can_issue`, an authority-controlled flag that is independent of
//!   approval and may be toggled at any time.
//!
//! Approval turns `can_issue` on. After that the two flags move separately:
//! an approved institution may be issuance-blocked, and the flag may be set
//! on a still-pending institution without approving it.

use std::str::FromStr;

use eduauth_core::ValidationError;
use serde::{Deserialize, Serialize};

use crate::account::{AccountError, AccountStatus, Transition};

/// Nested approval status of an institution record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Not yet reviewed.
    Pending,
    /// Approved by the authority.
    Approved,
}

impl ApprovalStatus {
    /// The wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
        }
    }
}

impl FromStr for ApprovalStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            other => Err(ValidationError::UnknownVariant {
                kind: "approval status",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The combined standing of an institution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstitutionStanding {
    /// The owning user's global status.
    pub account: AccountStatus,
    /// The nested approval status.
    pub approval: ApprovalStatus,
    /// Issuance permission.
    pub can_issue: bool,
}

impl InstitutionStanding {
    /// Standing of a freshly registered institution.
    pub fn registered() -> Self {
        Self {
            account: AccountStatus::Pending,
            approval: ApprovalStatus::Pending,
            can_issue: false,
        }
    }

    /// Both the account and the nested approval are through.
    pub fn is_fully_approved(&self) -> bool {
        self.account == AccountStatus::Active && self.approval == ApprovalStatus::Approved
    }

    /// Belongs in the admin's pending queue.
    ///
    /// Requires both statuses to be pending, so an approved institution whose
    /// account status later regressed does not reappear.
    pub fn awaits_review(&self) -> bool {
        self.account == AccountStatus::Pending && self.approval == ApprovalStatus::Pending
    }

    /// May mint certificates right now.
    pub fn may_issue(&self) -> bool {
        self.is_fully_approved() && self.can_issue
    }

    /// Approve: account active, approval approved, issuance enabled.
    ///
    /// A no-op when already fully approved, which leaves `can_issue` alone.
    pub fn approve(self) -> Result<Transition<Self>, AccountError> {
        if self.is_fully_approved() {
            return Ok(Transition::Unchanged(self));
        }
        let account = self.account.approve()?.state();
        Ok(Transition::Changed {
            from: self,
            to: Self {
                account,
                approval: ApprovalStatus::Approved,
                can_issue: true,
            },
        })
    }

    /// Reject the owning account. The nested approval stays pending.
    pub fn reject(self) -> Result<Transition<Self>, AccountError> {
        match self.account.reject()? {
            Transition::Unchanged(_) => Ok(Transition::Unchanged(self)),
            Transition::Changed { to, .. } => Ok(Transition::Changed {
                from: self,
                to: Self {
                    account: to,
                    ..self
                },
            }),
        }
    }

    /// Set the issuance permission flag, regardless of approval.
    pub fn set_issuance(self, can_issue: bool) -> Transition<Self> {
        if self.can_issue == can_issue {
            Transition::Unchanged(self)
        } else {
            Transition::Changed {
                from: self,
                to: Self { can_issue, ..self },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approved() -> InstitutionStanding {
        InstitutionStanding::registered().approve().unwrap().state()
    }

    #[test]
    fn registration_starts_pending_without_issuance() {
        let s = InstitutionStanding::registered();
        assert!(s.awaits_review());
        assert!(!s.is_fully_approved());
        assert!(!s.may_issue());
    }

    #[test]
    fn approval_sets_all_three() {
        let s = approved();
        assert_eq!(s.account, AccountStatus::Active);
        assert_eq!(s.approval, ApprovalStatus::Approved);
        assert!(s.can_issue);
        assert!(s.may_issue());
        assert!(!s.awaits_review());
    }

    #[test]
    fn second_approval_is_unchanged_and_keeps_block() {
        let blocked = approved().set_issuance(false).state();
        let t = blocked.approve().unwrap();
        assert!(!t.is_changed());
        assert!(!t.state().can_issue);
    }

    #[test]
    fn partial_standing_is_completed_by_approval() {
        let partial = InstitutionStanding {
            account: AccountStatus::Active,
            approval: ApprovalStatus::Pending,
            can_issue: false,
        };
        assert!(!partial.awaits_review());
        let t = partial.approve().unwrap();
        assert!(t.is_changed());
        assert!(t.state().may_issue());
    }

    #[test]
    fn issuance_toggle_is_independent_of_approval() {
        let s = approved();
        let off = s.set_issuance(false);
        assert!(off.is_changed());
        assert!(off.state().is_fully_approved());
        assert!(!off.state().may_issue());

        assert!(!off.state().set_issuance(false).is_changed());
        assert!(off.state().set_issuance(true).state().may_issue());

        let pending_enabled = InstitutionStanding::registered().set_issuance(true).state();
        assert!(pending_enabled.can_issue);
        assert!(!pending_enabled.may_issue());
        assert!(pending_enabled.awaits_review());
    }

    #[test]
    fn rejection_leaves_approval_pending() {
        let t = InstitutionStanding::registered().reject().unwrap();
        assert_eq!(t.state().account, AccountStatus::Rejected);
        assert_eq!(t.state().approval, ApprovalStatus::Pending);
        assert!(t.state().approve().is_err());
        assert!(approved().reject().is_err());
    }
}
