//! # eduauth-state: Registry State Machines
//!
//! Pure, I/O-free state machines. Each transition either returns the new
//! state or an error naming the rejected move; callers persist the result.
//!
//! - [`account`]: user lifecycle: `pending → active | rejected`.
//! - [`institution`]: an institution's standing: account status, the nested
//!   approval status and the independent issuance permission flag.
//! - [`review`]: profile change-request review plus the predicate deciding
//!   which proposed fields count as identity changes.
//!
//! Idempotent operations return [`Transition::Unchanged`] rather than an
//! error, so that a repeated admin click can be told apart from a real
//! change without being treated as a failure.

pub mod account;
pub mod institution;
pub mod review;

pub use account::{AccountError, AccountStatus, Transition};
pub use institution::{ApprovalStatus, InstitutionStanding};
pub use review::{touches_identity, ProfileField, ReviewDecision, ReviewError, ReviewStatus};
