//! Stored record types, one per table.

use chrono::{DateTime, NaiveDate, Utc};
use eduauth_core::{
    CertificateFingerprint, CertificateId, CertificateMetadata, CertificateStatus,
    CertificateType, Email, EnrollmentId, IdentityFingerprint, IdentityId, IdentityType,
    InstitutionId, InstitutionType, ProfileRequestId, Role, StudentId, UserId,
};
use eduauth_state::{
    AccountStatus, ApprovalStatus, InstitutionStanding, ProfileField, ReviewStatus,
};
use uuid::Uuid;

/// Who verified a record, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationStamp {
    pub by: UserId,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    pub email: Email,
    pub password_hash: String,
    pub role: Role,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentIdentityRecord {
    pub id: IdentityId,
    pub user_id: UserId,
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub identity_type: IdentityType,
    pub identity_fingerprint: IdentityFingerprint,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub verified: Option<VerificationStamp>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentProfileRecord {
    /// The global student id.
    pub id: StudentId,
    pub identity_id: IdentityId,
    pub user_id: UserId,
    pub photo_path: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstitutionRecord {
    pub id: InstitutionId,
    pub user_id: UserId,
    pub name: String,
    pub institution_type: InstitutionType,
    pub registration_number: String,
    pub approval: ApprovalStatus,
    pub can_issue: bool,
    pub verified: Option<VerificationStamp>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InstitutionRecord {
    /// Combine with the owning account's status.
    pub fn standing(&self, account: AccountStatus) -> InstitutionStanding {
        InstitutionStanding {
            account,
            approval: self.approval,
            can_issue: self.can_issue,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentRecord {
    pub id: EnrollmentId,
    pub institution_id: InstitutionId,
    pub student_id: StudentId,
    pub local_student_id: String,
    pub department: String,
    pub session: String,
    pub enrolled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRecord {
    pub id: CertificateId,
    pub student_id: StudentId,
    pub institution_id: InstitutionId,
    pub issued_by: UserId,
    pub credential_name: String,
    pub certificate_type: CertificateType,
    pub issue_date: NaiveDate,
    pub field_of_study: Option<String>,
    pub grade: Option<String>,
    pub metadata: CertificateMetadata,
    pub status: CertificateStatus,
    pub fingerprint: CertificateFingerprint,
    pub created_at: DateTime<Utc>,
}

/// The fields a change request proposes. `None` means "leave as is".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileProposal {
    pub full_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub identity_type: Option<IdentityType>,
    pub identity_fingerprint: Option<IdentityFingerprint>,
    pub photo_path: Option<String>,
}

impl ProfileProposal {
    /// Which fields carry a proposed value.
    pub fn fields(&self) -> Vec<ProfileField> {
        let mut fields = Vec::new();
        if self.full_name.is_some() {
            fields.push(ProfileField::FullName);
        }
        if self.date_of_birth.is_some() {
            fields.push(ProfileField::DateOfBirth);
        }
        if self.identity_type.is_some() {
            fields.push(ProfileField::IdentityType);
        }
        if self.identity_fingerprint.is_some() {
            fields.push(ProfileField::IdentityNumber);
        }
        if self.photo_path.is_some() {
            fields.push(ProfileField::Photo);
        }
        fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRequestRecord {
    pub id: ProfileRequestId,
    pub user_id: UserId,
    pub identity_id: IdentityId,
    pub status: ReviewStatus,
    pub proposal: ProfileProposal,
    pub proof_document: Option<String>,
    pub reviewer: Option<UserId>,
    pub reviewer_comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationLogRecord {
    pub id: Uuid,
    pub certificate_id: CertificateId,
    pub verifier_type: String,
    pub result: String,
    pub verified_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proposal_field_listing() {
        let mut p = ProfileProposal::default();
        assert!(p.is_empty());
        p.photo_path = Some("/uploads/p.jpg".into());
        p.date_of_birth = NaiveDate::from_ymd_opt(2001, 5, 4);
        assert_eq!(p.fields(), vec![ProfileField::DateOfBirth, ProfileField::Photo]);
    }
}
