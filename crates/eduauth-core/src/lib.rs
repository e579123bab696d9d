#![deny(missing_docs)]

//! # eduauth-core: Foundational Types for the EduAuth Registry
//!
//! Every other crate in the workspace depends on this one. It has no internal
//! crate dependencies, only `serde`, `serde_json`, `thiserror`, `chrono`,
//! `uuid`, and `sha2` from the external ecosystem.
//!
//! ## Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** A [`StudentId`] cannot be passed
//!    where an [`InstitutionId`] is expected.
//!
//! 2. **Raw identity numbers never leave the hasher.** The only representation
//!    of a national ID or birth-certificate number that the rest of the system
//!    sees is an [`IdentityFingerprint`].
//!
//! 3. **[`CanonicalBytes`] feeds every credential fingerprint.** Certificate
//!    content is serialized with sorted keys and compact separators before it
//!    is hashed, so semantically equal metadata always hashes the same.
//!
//! 4. **Closed sets are enums.** Roles, institution types, identity types and
//!    certificate types parse from their wire strings and reject anything else.

pub mod canonical;
pub mod digest;
pub mod domain;
pub mod error;
pub mod fingerprint;
pub mod identity;
pub mod metadata;
pub mod temporal;

pub use canonical::CanonicalBytes;
pub use digest::{sha256_digest, sha256_raw, ContentDigest};
pub use domain::{CertificateStatus, CertificateType, IdentityType, InstitutionType, Role};
pub use error::{CanonicalizationError, ValidationError};
pub use fingerprint::{CertificateFingerprint, CredentialContent, IdentityFingerprint, IssuanceSalt};
pub use identity::{
    CertificateId, Email, EnrollmentId, IdentityId, InstitutionId, ProfileRequestId, StudentId,
    UserId,
};
pub use metadata::{normalize_metadata, AcademicMetadata, CertificateMetadata, MetadataPayload, Scalar};
pub use temporal::{parse_calendar_date, Clock, ManualClock, SystemClock};
