//! # Fingerprints
//!
//! Two one-way SHA-256 fingerprints, both hex-encoded:
//!
//! - [`IdentityFingerprint`] turns a raw national ID or birth-certificate
//!   number into a lookup key. It is deliberately unsalted: the same number
//!   must always produce the same fingerprint so that enrollment and
//!   duplicate detection can find the student. One-wayness is the only
//!   protection for the underlying number.
//!
//! - [`CertificateFingerprint`] identifies a certificate. It hashes the
//!   canonical form of the credential content plus an [`IssuanceSalt`] taken
//!   from the issuance instant, so two otherwise identical issuances never
//!   share a fingerprint.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::canonical::CanonicalBytes;
use crate::digest::{is_sha256_hex, sha256_digest, sha256_raw};
use crate::error::{CanonicalizationError, ValidationError};
use crate::identity::{InstitutionId, StudentId};
use crate::metadata::CertificateMetadata;

/// Fingerprint of a personal identity number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdentityFingerprint(String);

impl IdentityFingerprint {
    /// Fingerprint a raw identifier.
    ///
    /// Surrounding whitespace is trimmed first. A blank input yields `None`,
    /// which callers must treat as "missing", never as a valid fingerprint.
    pub fn of(raw: &str) -> Option<Self> {
        let normalized = raw.trim();
        if normalized.is_empty() {
            return None;
        }
        Some(Self(sha256_raw(normalized.as_bytes()).to_hex()))
    }

    /// [`of`](Self::of) for an optional input; `None` stays `None`.
    pub fn of_optional(raw: Option<&str>) -> Option<Self> {
        raw.and_then(Self::of)
    }

    /// Rebuild a fingerprint read back from storage.
    pub fn from_hex(hex: &str) -> Result<Self, ValidationError> {
        if is_sha256_hex(hex) {
            Ok(Self(hex.to_string()))
        } else {
            Err(ValidationError::MalformedFingerprint(hex.to_string()))
        }
    }

    /// The hex form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for IdentityFingerprint {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<IdentityFingerprint> for String {
    fn from(fp: IdentityFingerprint) -> Self {
        fp.0
    }
}

impl std::fmt::Display for IdentityFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Uniqueness salt: the issuance instant in nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssuanceSalt(i64);

impl IssuanceSalt {
    /// Salt derived from an instant.
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self(
            instant
                .timestamp_nanos_opt()
                .unwrap_or_else(|| instant.timestamp_micros()),
        )
    }

    /// The raw nanosecond value.
    pub fn as_nanos(&self) -> i64 {
        self.0
    }
}

/// The semantic content of a certificate that its fingerprint covers.
#[derive(Debug, Clone, Copy)]
pub struct CredentialContent<'a> {
    /// The issuing institution.
    pub issuer: InstitutionId,
    /// The global student id of the holder.
    pub subject: StudentId,
    /// Credential name as printed, e.g. "BSc in Computer Science".
    pub credential_name: &'a str,
    /// Date of issue.
    pub issue_date: NaiveDate,
    /// Normalized metadata.
    pub metadata: &'a CertificateMetadata,
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
    issuer: InstitutionId,
    subject: StudentId,
    credential_name: &'a str,
    issue_date: NaiveDate,
    metadata: &'a CertificateMetadata,
    salt: i64,
}

/// Fingerprint of an issued certificate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CertificateFingerprint(String);

impl CertificateFingerprint {
    /// Compute the fingerprint of `content` issued at the instant behind `salt`.
    pub fn compute(
        content: &CredentialContent<'_>,
        salt: IssuanceSalt,
    ) -> Result<Self, CanonicalizationError> {
        let input = FingerprintInput {
            issuer: content.issuer,
            subject: content.subject,
            credential_name: content.credential_name,
            issue_date: content.issue_date,
            metadata: content.metadata,
            salt: salt.as_nanos(),
        };
        let canonical = CanonicalBytes::new(&input)?;
        Ok(Self(sha256_digest(&canonical).to_hex()))
    }

    /// Rebuild a fingerprint read back from storage.
    pub fn from_hex(hex: &str) -> Result<Self, ValidationError> {
        if is_sha256_hex(hex) {
            Ok(Self(hex.to_string()))
        } else {
            Err(ValidationError::MalformedFingerprint(hex.to_string()))
        }
    }

    /// The hex form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CertificateFingerprint {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<CertificateFingerprint> for String {
    fn from(fp: CertificateFingerprint) -> Self {
        fp.0
    }
}

impl std::fmt::Display for CertificateFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
