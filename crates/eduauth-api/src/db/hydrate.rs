//! Startup hydration.
//!
//! Reads every table and rebuilds the in-memory [`Tables`] through the same
//! checked writes a transaction uses, so a database that violates a
//! uniqueness rule is reported instead of silently loaded.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use eduauth_core::{
    CertificateFingerprint, CertificateMetadata, Email, IdentityFingerprint, ValidationError,
};
use sqlx::PgPool;
use uuid::Uuid;

use super::DbError;
use crate::registry::ledger::UniqueViolation;
use crate::registry::records::{
    CertificateRecord, EnrollmentRecord, InstitutionRecord, ProfileProposal,
    ProfileRequestRecord, StudentIdentityRecord, StudentProfileRecord, UserRecord,
    VerificationStamp,
};
use crate::registry::Tables;

fn corrupt(table: &str, id: Uuid, err: impl std::fmt::Display) -> DbError {
    DbError::Corrupt(format!("{table} {id}: {err}"))
}

fn parse<T>(table: &str, id: Uuid, raw: &str) -> Result<T, DbError>
where
    T: FromStr<Err = ValidationError>,
{
    raw.parse().map_err(|e| corrupt(table, id, e))
}

fn stamp(by: Option<Uuid>, at: Option<DateTime<Utc>>) -> Option<VerificationStamp> {
    match (by, at) {
        (Some(by), Some(at)) => Some(VerificationStamp { by: by.into(), at }),
        _ => None,
    }
}

fn violated(v: UniqueViolation) -> DbError {
    DbError::Corrupt(format!("unique constraint violated on load: {}", v.0))
}

/// Load every table.
pub async fn load_tables(pool: &PgPool) -> Result<Tables, DbError> {
    let mut tables = Tables::default();

    for row in sqlx::query_as::<_, UserRow>(
        "SELECT id, email, password_hash, role, status, created_at, updated_at
         FROM users ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?
    {
        tables.upsert_user(row.into_record()?).map_err(violated)?;
    }

    for row in sqlx::query_as::<_, IdentityRow>(
        "SELECT id, user_id, full_name, date_of_birth, identity_type, identity_fingerprint,
                phone, address, verified_by, verified_at, updated_at
         FROM student_identities",
    )
    .fetch_all(pool)
    .await?
    {
        tables.upsert_identity(row.into_record()?).map_err(violated)?;
    }

    for row in sqlx::query_as::<_, ProfileRow>(
        "SELECT id, identity_id, user_id, photo_path, updated_at FROM student_profiles",
    )
    .fetch_all(pool)
    .await?
    {
        tables.upsert_profile(row.into_record()).map_err(violated)?;
    }

    for row in sqlx::query_as::<_, InstitutionRow>(
        "SELECT id, user_id, name, institution_type, registration_number, approval_status,
                can_issue, verified_by, verified_at, created_at, updated_at
         FROM institutions",
    )
    .fetch_all(pool)
    .await?
    {
        tables.upsert_institution(row.into_record()?).map_err(violated)?;
    }

    for row in sqlx::query_as::<_, EnrollmentRow>(
        "SELECT id, institution_id, student_id, local_student_id, department, session, enrolled_at
         FROM enrollments ORDER BY enrolled_at",
    )
    .fetch_all(pool)
    .await?
    {
        tables.insert_enrollment(row.into_record()).map_err(violated)?;
    }

    for row in sqlx::query_as::<_, CertificateRow>(
        "SELECT id, student_id, institution_id, issued_by, credential_name, certificate_type,
                issue_date, field_of_study, grade, metadata, status, fingerprint, created_at
         FROM certificates ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?
    {
        tables.insert_certificate(row.into_record()?).map_err(violated)?;
    }

    for row in sqlx::query_as::<_, ProfileRequestRow>(
        "SELECT id, user_id, identity_id, status, full_name, date_of_birth, identity_type,
                identity_fingerprint, photo_path, proof_document, reviewer_id, reviewer_comment,
                created_at, reviewed_at
         FROM profile_requests ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?
    {
        tables.upsert_profile_request(row.into_record()?).map_err(violated)?;
    }

    Ok(tables)
}

// -- Row types ----------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    role: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_record(self) -> Result<UserRecord, DbError> {
        Ok(UserRecord {
            id: self.id.into(),
            email: Email::parse(&self.email).map_err(|e| corrupt("users", self.id, e))?,
            password_hash: self.password_hash,
            role: parse("users", self.id, &self.role)?,
            status: parse("users", self.id, &self.status)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct IdentityRow {
    id: Uuid,
    user_id: Uuid,
    full_name: String,
    date_of_birth: NaiveDate,
    identity_type: String,
    identity_fingerprint: String,
    phone: Option<String>,
    address: Option<String>,
    verified_by: Option<Uuid>,
    verified_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl IdentityRow {
    fn into_record(self) -> Result<StudentIdentityRecord, DbError> {
        let table = "student_identities";
        Ok(StudentIdentityRecord {
            id: self.id.into(),
            user_id: self.user_id.into(),
            full_name: self.full_name,
            date_of_birth: self.date_of_birth,
            identity_type: parse(table, self.id, &self.identity_type)?,
            identity_fingerprint: IdentityFingerprint::from_hex(&self.identity_fingerprint)
                .map_err(|e| corrupt(table, self.id, e))?,
            phone: self.phone,
            address: self.address,
            verified: stamp(self.verified_by, self.verified_at),
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    id: Uuid,
    identity_id: Uuid,
    user_id: Uuid,
    photo_path: String,
    updated_at: DateTime<Utc>,
}

impl ProfileRow {
    fn into_record(self) -> StudentProfileRecord {
        StudentProfileRecord {
            id: self.id.into(),
            identity_id: self.identity_id.into(),
            user_id: self.user_id.into(),
            photo_path: self.photo_path,
            updated_at: self.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct InstitutionRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    institution_type: String,
    registration_number: String,
    approval_status: String,
    can_issue: bool,
    verified_by: Option<Uuid>,
    verified_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl InstitutionRow {
    fn into_record(self) -> Result<InstitutionRecord, DbError> {
        Ok(InstitutionRecord {
            id: self.id.into(),
            user_id: self.user_id.into(),
            name: self.name,
            institution_type: parse("institutions", self.id, &self.institution_type)?,
            registration_number: self.registration_number,
            approval: parse("institutions", self.id, &self.approval_status)?,
            can_issue: self.can_issue,
            verified: stamp(self.verified_by, self.verified_at),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EnrollmentRow {
    id: Uuid,
    institution_id: Uuid,
    student_id: Uuid,
    local_student_id: String,
    department: String,
    session: String,
    enrolled_at: DateTime<Utc>,
}

impl EnrollmentRow {
    fn into_record(self) -> EnrollmentRecord {
        EnrollmentRecord {
            id: self.id.into(),
            institution_id: self.institution_id.into(),
            student_id: self.student_id.into(),
            local_student_id: self.local_student_id,
            department: self.department,
            session: self.session,
            enrolled_at: self.enrolled_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CertificateRow {
    id: Uuid,
    student_id: Uuid,
    institution_id: Uuid,
    issued_by: Uuid,
    credential_name: String,
    certificate_type: String,
    issue_date: NaiveDate,
    field_of_study: Option<String>,
    grade: Option<String>,
    metadata: serde_json::Value,
    status: String,
    fingerprint: String,
    created_at: DateTime<Utc>,
}

impl CertificateRow {
    fn into_record(self) -> Result<CertificateRecord, DbError> {
        let table = "certificates";
        let metadata: CertificateMetadata =
            serde_json::from_value(self.metadata).map_err(|e| corrupt(table, self.id, e))?;
        Ok(CertificateRecord {
            id: self.id.into(),
            student_id: self.student_id.into(),
            institution_id: self.institution_id.into(),
            issued_by: self.issued_by.into(),
            credential_name: self.credential_name,
            certificate_type: parse(table, self.id, &self.certificate_type)?,
            issue_date: self.issue_date,
            field_of_study: self.field_of_study,
            grade: self.grade,
            metadata,
            status: parse(table, self.id, &self.status)?,
            fingerprint: CertificateFingerprint::from_hex(&self.fingerprint)
                .map_err(|e| corrupt(table, self.id, e))?,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRequestRow {
    id: Uuid,
    user_id: Uuid,
    identity_id: Uuid,
    status: String,
    full_name: Option<String>,
    date_of_birth: Option<NaiveDate>,
    identity_type: Option<String>,
    identity_fingerprint: Option<String>,
    photo_path: Option<String>,
    proof_document: Option<String>,
    reviewer_id: Option<Uuid>,
    reviewer_comment: Option<String>,
    created_at: DateTime<Utc>,
    reviewed_at: Option<DateTime<Utc>>,
}

impl ProfileRequestRow {
    fn into_record(self) -> Result<ProfileRequestRecord, DbError> {
        let table = "profile_requests";
        let identity_type = self
            .identity_type
            .as_deref()
            .map(|raw| parse(table, self.id, raw))
            .transpose()?;
        let identity_fingerprint = self
            .identity_fingerprint
            .as_deref()
            .map(|hex| IdentityFingerprint::from_hex(hex).map_err(|e| corrupt(table, self.id, e)))
            .transpose()?;
        Ok(ProfileRequestRecord {
            id: self.id.into(),
            user_id: self.user_id.into(),
            identity_id: self.identity_id.into(),
            status: parse(table, self.id, &self.status)?,
            proposal: ProfileProposal {
                full_name: self.full_name,
                date_of_birth: self.date_of_birth,
                identity_type,
                identity_fingerprint,
                photo_path: self.photo_path,
            },
            proof_document: self.proof_document,
            reviewer: self.reviewer_id.map(Into::into),
            reviewer_comment: self.reviewer_comment,
            created_at: self.created_at,
            reviewed_at: self.reviewed_at,
        })
    }
}
