//! # Issuance Engine
//!
//! Preconditions run in this order, each with its own failure:
//!
//! 1. the caller carries an institution id,
//! 2. the institution may issue right now (read live, not from the session),
//! 3. the required fields are present and well formed,
//! 4. the local student id is on the institution's roster.
//!
//! Steps 2 and 4 are repeated inside the write transaction, so a permission
//! revoked or an enrollment missing at commit time still stops the write.

use chrono::{DateTime, NaiveDate, Utc};
use eduauth_core::{
    normalize_metadata, parse_calendar_date, CertificateFingerprint, CertificateId,
    CertificateStatus, CertificateType, CredentialContent, InstitutionId, IssuanceSalt,
    MetadataPayload, ValidationError,
};
use serde::Serialize;
use utoipa::ToSchema;

use super::approval::Principal;
use super::error::RegistryError;
use super::input::{bounded, optional, required};
use super::ledger::Tables;
use super::records::{CertificateRecord, InstitutionRecord};
use super::Registry;
use crate::notify::{Notification, NotificationKind};

const MAX_CREDENTIAL_NAME_LEN: usize = 200;

/// Raw issuance input.
#[derive(Debug, Clone, Default)]
pub struct IssueRequest {
    pub local_student_id: Option<String>,
    pub credential_name: Option<String>,
    pub certificate_type: Option<String>,
    pub issue_date: Option<String>,
    pub field_of_study: Option<String>,
    pub grade: Option<String>,
    pub metadata: Option<MetadataPayload>,
}

struct CheckedIssue {
    local_student_id: String,
    credential_name: String,
    certificate_type: CertificateType,
    issue_date: NaiveDate,
    field_of_study: Option<String>,
    grade: Option<String>,
    metadata: Option<MetadataPayload>,
}

impl IssueRequest {
    fn check(self) -> Result<CheckedIssue, ValidationError> {
        let local_student_id = required("localStudentId", self.local_student_id.as_deref())?;
        let credential_name = bounded(
            "credentialName",
            required("credentialName", self.credential_name.as_deref())?,
            MAX_CREDENTIAL_NAME_LEN,
        )?;
        let certificate_type = required("certificateType", self.certificate_type.as_deref())?.parse()?;
        let issue_date = parse_calendar_date(
            "issueDate",
            &required("issueDate", self.issue_date.as_deref())?,
        )?;
        Ok(CheckedIssue {
            local_student_id,
            credential_name,
            certificate_type,
            issue_date,
            field_of_study: optional(self.field_of_study.as_deref()),
            grade: optional(self.grade.as_deref()),
            metadata: self.metadata,
        })
    }
}

/// What the issuer gets back. Never includes identity data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCertificate {
    #[schema(value_type = String)]
    pub certificate_id: CertificateId,
    #[schema(value_type = String)]
    pub fingerprint: CertificateFingerprint,
    pub student_name: String,
    pub credential_name: String,
    pub issued_at: DateTime<Utc>,
}

/// The issuing institution, if it may issue right now.
fn issuing_institution(
    tables: &Tables,
    institution_id: InstitutionId,
) -> Result<InstitutionRecord, RegistryError> {
    let denied = || RegistryError::forbidden("issuance permission denied");
    let institution = tables.institution(institution_id).ok_or_else(denied)?;
    let owner = tables.user(institution.user_id).ok_or_else(denied)?;
    if institution.standing(owner.status).may_issue() {
        Ok(institution.clone())
    } else {
        Err(denied())
    }
}

impl Registry {
    /// Mint a certificate for an enrolled student.
    pub async fn issue(
        &self,
        caller: &Principal,
        request: IssueRequest,
    ) -> Result<IssuedCertificate, RegistryError> {
        let institution_id = caller
            .institution_id
            .ok_or_else(|| RegistryError::forbidden("institution context missing"))?;
        self.ledger
            .read(|t| issuing_institution(t, institution_id).map(|_| ()))?;
        let checked = request.check()?;

        let issuer = caller.user_id;
        let at = self.now();
        let (certificate, institution_name, student_name, recipient) = self
            .ledger
            .transact("issue_certificate", move |tx| {
                let tables = tx.tables();
                let institution = issuing_institution(tables, institution_id)?;
                let enrollment = tables
                    .enrollment_by_local_id(institution_id, &checked.local_student_id)
                    .ok_or_else(|| {
                        RegistryError::forbidden(
                            "access denied: this student is not enrolled in your institution",
                        )
                    })?;
                let student_id = enrollment.student_id;
                let (student_name, recipient) = tables
                    .profile(student_id)
                    .and_then(|p| tables.identity(p.identity_id))
                    .and_then(|i| Some((i.full_name.clone(), tables.user(i.user_id)?.email.clone())))
                    .ok_or_else(|| {
                        RegistryError::Persistence(format!("enrolled student {student_id} has no identity"))
                    })?;

                let metadata = normalize_metadata(
                    checked.metadata.as_ref(),
                    checked.field_of_study.as_deref(),
                    checked.grade.as_deref(),
                );
                let content = CredentialContent {
                    issuer: institution_id,
                    subject: student_id,
                    credential_name: &checked.credential_name,
                    issue_date: checked.issue_date,
                    metadata: &metadata,
                };
                let fingerprint = CertificateFingerprint::compute(&content, IssuanceSalt::at(at))?;

                let record = CertificateRecord {
                    id: CertificateId::new(),
                    student_id,
                    institution_id,
                    issued_by: issuer,
                    credential_name: checked.credential_name,
                    certificate_type: checked.certificate_type,
                    issue_date: checked.issue_date,
                    field_of_study: checked.field_of_study,
                    grade: checked.grade,
                    metadata,
                    status: CertificateStatus::Active,
                    fingerprint,
                    created_at: at,
                };
                tx.insert_certificate(record.clone())?;
                Ok((record, institution.name, student_name, recipient))
            })
            .await?;

        tracing::info!(
            %institution_id,
            certificate_id = %certificate.id,
            fingerprint = %certificate.fingerprint,
            "certificate issued"
        );
        self.notify(Notification::new(
            recipient,
            NotificationKind::CertificateIssued {
                student_name: student_name.clone(),
                credential_name: certificate.credential_name.clone(),
                institution_name,
                fingerprint: certificate.fingerprint.clone(),
                verify_url: self.verify_url(certificate.fingerprint.as_str()),
            },
        ));

        Ok(IssuedCertificate {
            certificate_id: certificate.id,
            fingerprint: certificate.fingerprint,
            student_name,
            credential_name: certificate.credential_name,
            issued_at: certificate.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::enrollment::NewEnrollment;
    use crate::registry::testing::*;

    fn bsc(local: &str) -> IssueRequest {
        IssueRequest {
            local_student_id: Some(local.into()),
            credential_name: Some("BSc CSE".into()),
            certificate_type: Some("degree".into()),
            issue_date: Some("2025-01-01".into()),
            ..IssueRequest::default()
        }
    }

    async fn enrolled(f: &Fixture) -> Principal {
        f.active_student("s@example.org", NID).await;
        let inst = f.active_institution("i@example.org").await;
        let request = NewEnrollment::new(Some("CSE-01"), Some(NID), Some("CSE"), Some("2021")).unwrap();
        f.registry
            .enroll(inst.institution_id.unwrap(), request)
            .await
            .unwrap();
        inst
    }

    #[tokio::test]
    async fn issues_to_enrolled_student() {
        let f = fixture().await;
        let inst = enrolled(&f).await;
        let issued = f.registry.issue(&inst, bsc("CSE-01")).await.unwrap();
        assert_eq!(issued.student_name, "Nusrat Jahan");
        assert_eq!(issued.fingerprint.as_str().len(), 64);

        let snapshot = f.registry.ledger().snapshot();
        let cert = snapshot.certificate_by_fingerprint(&issued.fingerprint).unwrap();
        assert_eq!(cert.status, CertificateStatus::Active);
        assert_eq!(cert.issued_by, inst.user_id);

        let sent = f.notifier.sent();
        let last = sent.last().unwrap();
        assert_eq!(last.recipient.as_str(), "s@example.org");
        assert!(last
            .body()
            .contains(&format!("http://localhost:3000/verify/{}", issued.fingerprint)));
    }

    #[tokio::test]
    async fn identical_requests_get_distinct_fingerprints() {
        let f = fixture().await;
        let inst = enrolled(&f).await;
        let a = f.registry.issue(&inst, bsc("CSE-01")).await.unwrap();
        let b = f.registry.issue(&inst, bsc("CSE-01")).await.unwrap();
        assert_ne!(a.fingerprint, b.fingerprint);
        assert_eq!(f.registry.ledger().snapshot().certificate_count(), 2);
    }

    #[tokio::test]
    async fn unenrolled_local_id_is_access_denied() {
        let f = fixture().await;
        let inst = enrolled(&f).await;
        let err = f.registry.issue(&inst, bsc("CSE-99")).await.unwrap_err();
        assert_eq!(
            err,
            RegistryError::Authorization(
                "access denied: this student is not enrolled in your institution".into()
            )
        );
        assert_eq!(f.registry.ledger().snapshot().certificate_count(), 0);
    }

    #[tokio::test]
    async fn revoked_permission_is_read_live() {
        let f = fixture().await;
        let inst = enrolled(&f).await;
        assert_eq!(inst.can_issue, Some(true));
        let target = *inst.user_id.as_uuid();

        f.registry.set_issuance_permission(target, false).await.unwrap();
        let err = f.registry.issue(&inst, bsc("CSE-01")).await.unwrap_err();
        assert_eq!(err, RegistryError::Authorization("issuance permission denied".into()));

        f.registry.set_issuance_permission(target, true).await.unwrap();
        f.registry.issue(&inst, bsc("CSE-01")).await.unwrap();
    }

    #[tokio::test]
    async fn permission_is_checked_before_fields() {
        let f = fixture().await;
        let inst = enrolled(&f).await;
        f.registry
            .set_issuance_permission(*inst.user_id.as_uuid(), false)
            .await
            .unwrap();
        let err = f
            .registry
            .issue(&inst, IssueRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Authorization(_)));
    }

    #[tokio::test]
    async fn missing_fields_are_validation_errors() {
        let f = fixture().await;
        let inst = enrolled(&f).await;
        let mut req = bsc("CSE-01");
        req.credential_name = Some("  ".into());
        let err = f.registry.issue(&inst, req).await.unwrap_err();
        assert_eq!(err, RegistryError::Validation("credentialName is required".into()));

        let mut req = bsc("CSE-01");
        req.certificate_type = Some("badge".into());
        assert!(matches!(
            f.registry.issue(&inst, req).await,
            Err(RegistryError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn caller_without_institution_context_is_rejected() {
        let f = fixture().await;
        let student = f.active_student("s@example.org", NID).await;
        let principal = f.principal(student);
        let err = f.registry.issue(&principal, bsc("CSE-01")).await.unwrap_err();
        assert_eq!(err, RegistryError::Authorization("institution context missing".into()));
    }

    #[tokio::test]
    async fn explicit_fields_override_metadata() {
        let f = fixture().await;
        let inst = enrolled(&f).await;
        let mut req = bsc("CSE-01");
        req.field_of_study = Some("Computer Science".into());
        req.metadata = Some(
            serde_json::from_value(serde_json::json!({
                "schema": "legacy_details",
                "details": {"major": "Physics", "cgpa": "3.9", "honours": true}
            }))
            .unwrap(),
        );
        let issued = f.registry.issue(&inst, req).await.unwrap();
        let snapshot = f.registry.ledger().snapshot();
        let cert = snapshot.certificate_by_fingerprint(&issued.fingerprint).unwrap();
        assert_eq!(cert.metadata.major.as_deref(), Some("Computer Science"));
        assert_eq!(cert.metadata.grade.as_deref(), Some("3.9"));
        assert_eq!(cert.metadata.extra.get("honours").map(String::as_str), Some("true"));
    }
}
