//! # Verification Reader
//!
//! Public lookup of a certificate by fingerprint, plus the holder's own list.
//! Only non-sensitive fields are exposed: names, photo path, credential data.
//!
//! Each successful lookup hands a log entry to the registry's
//! [`VerificationLog`](super::VerificationLog) after the summary is built.
//! That write can fail without affecting the response.

use chrono::{DateTime, NaiveDate, Utc};
use eduauth_core::{
    CertificateFingerprint, CertificateId, CertificateMetadata, CertificateStatus,
    CertificateType, InstitutionType, StudentId,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::approval::Principal;
use super::error::RegistryError;
use super::ledger::Tables;
use super::records::{CertificateRecord, VerificationLogRecord};
use super::Registry;

pub const VERIFIER_PUBLIC: &str = "public";
pub const RESULT_VALID: &str = "valid";

/// The public view of a certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSummary {
    #[schema(value_type = String)]
    pub fingerprint: CertificateFingerprint,
    pub credential_name: String,
    #[schema(value_type = String)]
    pub certificate_type: CertificateType,
    pub issue_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_of_study: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[schema(value_type = Object)]
    pub metadata: CertificateMetadata,
    #[schema(value_type = String)]
    pub status: CertificateStatus,
    pub issued_at: DateTime<Utc>,
    #[schema(value_type = String)]
    pub student_id: StudentId,
    pub student_name: String,
    pub student_photo: String,
    pub institution_name: String,
    #[schema(value_type = String)]
    pub institution_type: InstitutionType,
}

/// A certificate as listed for its holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OwnCertificate {
    #[schema(value_type = String)]
    pub certificate_id: CertificateId,
    #[schema(value_type = String)]
    pub fingerprint: CertificateFingerprint,
    pub credential_name: String,
    #[schema(value_type = String)]
    pub certificate_type: CertificateType,
    pub issue_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_of_study: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[schema(value_type = String)]
    pub status: CertificateStatus,
    pub institution_name: String,
    pub issued_at: DateTime<Utc>,
}

fn summarize(tables: &Tables, cert: &CertificateRecord) -> Option<CertificateSummary> {
    let profile = tables.profile(cert.student_id)?;
    let identity = tables.identity(profile.identity_id)?;
    let institution = tables.institution(cert.institution_id)?;
    Some(CertificateSummary {
        fingerprint: cert.fingerprint.clone(),
        credential_name: cert.credential_name.clone(),
        certificate_type: cert.certificate_type,
        issue_date: cert.issue_date,
        field_of_study: cert.field_of_study.clone(),
        grade: cert.grade.clone(),
        metadata: cert.metadata.clone(),
        status: cert.status,
        issued_at: cert.created_at,
        student_id: profile.id,
        student_name: identity.full_name.clone(),
        student_photo: profile.photo_path.clone(),
        institution_name: institution.name.clone(),
        institution_type: institution.institution_type,
    })
}

fn not_found() -> RegistryError {
    RegistryError::not_found("certificate not found")
}

impl Registry {
    /// Resolve a fingerprint to its public summary.
    ///
    /// Case and surrounding whitespace in `fingerprint` are ignored. A
    /// malformed fingerprint is simply not found.
    pub async fn verify(&self, fingerprint: &str) -> Result<CertificateSummary, RegistryError> {
        let normalized = fingerprint.trim().to_ascii_lowercase();
        let fp = CertificateFingerprint::from_hex(&normalized).map_err(|_| not_found())?;
        let (certificate_id, summary) = self.ledger.read(|t| {
            let cert = t.certificate_by_fingerprint(&fp).ok_or_else(not_found)?;
            let summary = summarize(t, cert).ok_or_else(|| {
                tracing::error!(certificate_id = %cert.id, "certificate references missing records");
                RegistryError::Persistence(format!("certificate {} is dangling", cert.id))
            })?;
            Ok::<_, RegistryError>((cert.id, summary))
        })?;

        self.record_verification(certificate_id);
        Ok(summary)
    }

    fn record_verification(&self, certificate_id: CertificateId) {
        let entry = VerificationLogRecord {
            id: Uuid::new_v4(),
            certificate_id,
            verifier_type: VERIFIER_PUBLIC.to_string(),
            result: RESULT_VALID.to_string(),
            verified_at: self.now(),
        };
        if let Err(e) = self.verification_log().append(entry) {
            tracing::warn!(%certificate_id, error = %e, "verification log write failed");
        }
    }

    /// The caller's own certificates, newest issue date first.
    pub fn my_certificates(&self, caller: &Principal) -> Result<Vec<OwnCertificate>, RegistryError> {
        let student_id = caller
            .student_id
            .ok_or_else(|| RegistryError::forbidden("student context missing"))?;
        let mut certs: Vec<OwnCertificate> = self.ledger.read(|t| {
            t.certificates_of(student_id)
                .map(|c| OwnCertificate {
                    certificate_id: c.id,
                    fingerprint: c.fingerprint.clone(),
                    credential_name: c.credential_name.clone(),
                    certificate_type: c.certificate_type,
                    issue_date: c.issue_date,
                    field_of_study: c.field_of_study.clone(),
                    grade: c.grade.clone(),
                    status: c.status,
                    institution_name: t
                        .institution(c.institution_id)
                        .map(|i| i.name.clone())
                        .unwrap_or_default(),
                    issued_at: c.created_at,
                })
                .collect()
        });
        certs.sort_by(|a, b| {
            b.issue_date
                .cmp(&a.issue_date)
                .then_with(|| b.issued_at.cmp(&a.issued_at))
        });
        Ok(certs)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::registry::audit::{AuditError, VerificationLog};
    use crate::registry::enrollment::NewEnrollment;
    use crate::registry::issuance::IssueRequest;
    use crate::registry::testing::*;

    async fn issue_on(f: &Fixture, inst: &Principal, date: &str, name: &str) -> CertificateFingerprint {
        let req = IssueRequest {
            local_student_id: Some("CSE-01".into()),
            credential_name: Some(name.into()),
            certificate_type: Some("certificate".into()),
            issue_date: Some(date.into()),
            ..IssueRequest::default()
        };
        f.registry.issue(inst, req).await.unwrap().fingerprint
    }

    async fn setup(f: &Fixture) -> (Principal, Principal) {
        let student = f.active_student("s@example.org", NID).await;
        let inst = f.active_institution("i@example.org").await;
        let req = NewEnrollment::new(Some("CSE-01"), Some(NID), Some("CSE"), Some("2021")).unwrap();
        f.registry.enroll(inst.institution_id.unwrap(), req).await.unwrap();
        (f.principal(student), inst)
    }

    #[tokio::test]
    async fn verify_resolves_public_summary_and_logs() {
        let f = fixture().await;
        let (_, inst) = setup(&f).await;
        let fp = issue_on(&f, &inst, "2025-01-01", "BSc CSE").await;

        let summary = f.registry.verify(&format!("  {}  ", fp.as_str().to_uppercase())).await.unwrap();
        assert_eq!(summary.credential_name, "BSc CSE");
        assert_eq!(summary.student_name, "Nusrat Jahan");
        assert_eq!(summary.institution_name, "Dhaka University");
        assert_eq!(summary.status, CertificateStatus::Active);

        let logs = f.verifications.entries();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].verifier_type, "public");
        assert_eq!(logs[0].result, "valid");
    }

    #[tokio::test]
    async fn unknown_or_malformed_fingerprint_is_not_found() {
        let f = fixture().await;
        let zeros = "0".repeat(64);
        for fp in ["", "abc", zeros.as_str()] {
            assert_eq!(
                f.registry.verify(fp).await.unwrap_err(),
                RegistryError::NotFound("certificate not found".into())
            );
        }
        assert!(f.verifications.is_empty());
    }

    #[derive(Debug)]
    struct UnavailableLog;

    impl VerificationLog for UnavailableLog {
        fn append(&self, _: VerificationLogRecord) -> Result<(), AuditError> {
            Err(AuditError::Unavailable("disk full".into()))
        }
    }

    #[tokio::test]
    async fn failed_log_write_does_not_change_the_result() {
        let f = fixture().await;
        let (_, inst) = setup(&f).await;
        let fp = issue_on(&f, &inst, "2025-01-01", "BSc CSE").await;
        let expected = f.registry.verify(fp.as_str()).await.unwrap();

        let registry = f.registry.clone().with_verification_log(Arc::new(UnavailableLog));
        let summary = registry.verify(fp.as_str()).await.unwrap();
        assert_eq!(summary, expected);
    }

    #[tokio::test]
    async fn verify_does_not_touch_the_ledger() {
        let f = fixture().await;
        let (_, inst) = setup(&f).await;
        let fp = issue_on(&f, &inst, "2025-01-01", "BSc CSE").await;
        let before = f.registry.ledger().snapshot();
        for _ in 0..3 {
            f.registry.verify(fp.as_str()).await.unwrap();
        }
        assert!(Arc::ptr_eq(&before, &f.registry.ledger().snapshot()));
        assert_eq!(f.verifications.len(), 3);
    }

    #[tokio::test]
    async fn own_certificates_newest_first() {
        let f = fixture().await;
        let (student, inst) = setup(&f).await;
        issue_on(&f, &inst, "2023-06-01", "HSC").await;
        issue_on(&f, &inst, "2025-01-01", "BSc CSE").await;
        issue_on(&f, &inst, "2019-03-15", "SSC").await;

        let names: Vec<String> = f
            .registry
            .my_certificates(&student)
            .unwrap()
            .into_iter()
            .map(|c| c.credential_name)
            .collect();
        assert_eq!(names, ["BSc CSE", "HSC", "SSC"]);
    }

    #[tokio::test]
    async fn institution_has_no_own_certificates() {
        let f = fixture().await;
        let (_, inst) = setup(&f).await;
        assert!(matches!(
            f.registry.my_certificates(&inst),
            Err(RegistryError::Authorization(_))
        ));
    }
}
