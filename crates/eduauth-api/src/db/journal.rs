//! Change-set journal.
//!
//! [`persist`] replays the [`Change`]s of one committed ledger transaction as
//! upserts inside a single SQL transaction. Changes are applied in the order
//! they were made, so a row is always written after the rows it references.

use sqlx::{PgConnection, PgPool};

use super::DbError;
use crate::registry::records::{
    CertificateRecord, EnrollmentRecord, InstitutionRecord, ProfileRequestRecord,
    StudentIdentityRecord, StudentProfileRecord, UserRecord,
};
use crate::registry::Change;

/// Write `changes` atomically. On error nothing is committed.
pub async fn persist(pool: &PgPool, changes: &[Change]) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;
    for change in changes {
        match change {
            Change::User(rec) => upsert_user(&mut tx, rec).await?,
            Change::Identity(rec) => upsert_identity(&mut tx, rec).await?,
            Change::Profile(rec) => upsert_profile(&mut tx, rec).await?,
            Change::Institution(rec) => upsert_institution(&mut tx, rec).await?,
            Change::Enrollment(rec) => insert_enrollment(&mut tx, rec).await?,
            Change::Certificate(rec) => insert_certificate(&mut tx, rec).await?,
            Change::ProfileRequest(rec) => upsert_profile_request(&mut tx, rec).await?,
        }
    }
    tx.commit().await?;
    Ok(())
}

async fn upsert_user(conn: &mut PgConnection, rec: &UserRecord) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO users (id, email, password_hash, role, status, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (id) DO UPDATE SET
            email = EXCLUDED.email,
            password_hash = EXCLUDED.password_hash,
            status = EXCLUDED.status,
            updated_at = EXCLUDED.updated_at",
    )
    .bind(*rec.id.as_uuid())
    .bind(rec.email.as_str())
    .bind(&rec.password_hash)
    .bind(rec.role.as_str())
    .bind(rec.status.as_str())
    .bind(rec.created_at)
    .bind(rec.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_identity(conn: &mut PgConnection, rec: &StudentIdentityRecord) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO student_identities
            (id, user_id, full_name, date_of_birth, identity_type, identity_fingerprint,
             phone, address, verified_by, verified_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
         ON CONFLICT (id) DO UPDATE SET
            full_name = EXCLUDED.full_name,
            date_of_birth = EXCLUDED.date_of_birth,
            identity_type = EXCLUDED.identity_type,
            identity_fingerprint = EXCLUDED.identity_fingerprint,
            phone = EXCLUDED.phone,
            address = EXCLUDED.address,
            verified_by = EXCLUDED.verified_by,
            verified_at = EXCLUDED.verified_at,
            updated_at = EXCLUDED.updated_at",
    )
    .bind(*rec.id.as_uuid())
    .bind(*rec.user_id.as_uuid())
    .bind(&rec.full_name)
    .bind(rec.date_of_birth)
    .bind(rec.identity_type.as_str())
    .bind(rec.identity_fingerprint.as_str())
    .bind(rec.phone.as_deref())
    .bind(rec.address.as_deref())
    .bind(rec.verified.map(|v| *v.by.as_uuid()))
    .bind(rec.verified.map(|v| v.at))
    .bind(rec.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_profile(conn: &mut PgConnection, rec: &StudentProfileRecord) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO student_profiles (id, identity_id, user_id, photo_path, updated_at)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (id) DO UPDATE SET
            photo_path = EXCLUDED.photo_path,
            updated_at = EXCLUDED.updated_at",
    )
    .bind(*rec.id.as_uuid())
    .bind(*rec.identity_id.as_uuid())
    .bind(*rec.user_id.as_uuid())
    .bind(&rec.photo_path)
    .bind(rec.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_institution(conn: &mut PgConnection, rec: &InstitutionRecord) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO institutions
            (id, user_id, name, institution_type, registration_number, approval_status,
             can_issue, verified_by, verified_at, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
         ON CONFLICT (id) DO UPDATE SET
            approval_status = EXCLUDED.approval_status,
            can_issue = EXCLUDED.can_issue,
            verified_by = EXCLUDED.verified_by,
            verified_at = EXCLUDED.verified_at,
            updated_at = EXCLUDED.updated_at",
    )
    .bind(*rec.id.as_uuid())
    .bind(*rec.user_id.as_uuid())
    .bind(&rec.name)
    .bind(rec.institution_type.as_str())
    .bind(&rec.registration_number)
    .bind(rec.approval.as_str())
    .bind(rec.can_issue)
    .bind(rec.verified.map(|v| *v.by.as_uuid()))
    .bind(rec.verified.map(|v| v.at))
    .bind(rec.created_at)
    .bind(rec.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_enrollment(conn: &mut PgConnection, rec: &EnrollmentRecord) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO enrollments
            (id, institution_id, student_id, local_student_id, department, session, enrolled_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(*rec.id.as_uuid())
    .bind(*rec.institution_id.as_uuid())
    .bind(*rec.student_id.as_uuid())
    .bind(&rec.local_student_id)
    .bind(&rec.department)
    .bind(&rec.session)
    .bind(rec.enrolled_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_certificate(conn: &mut PgConnection, rec: &CertificateRecord) -> Result<(), DbError> {
    let metadata = serde_json::to_value(&rec.metadata)?;
    sqlx::query(
        "INSERT INTO certificates
            (id, student_id, institution_id, issued_by, credential_name, certificate_type,
             issue_date, field_of_study, grade, metadata, status, fingerprint, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
    )
    .bind(*rec.id.as_uuid())
    .bind(*rec.student_id.as_uuid())
    .bind(*rec.institution_id.as_uuid())
    .bind(*rec.issued_by.as_uuid())
    .bind(&rec.credential_name)
    .bind(rec.certificate_type.as_str())
    .bind(rec.issue_date)
    .bind(rec.field_of_study.as_deref())
    .bind(rec.grade.as_deref())
    .bind(&metadata)
    .bind(rec.status.as_str())
    .bind(rec.fingerprint.as_str())
    .bind(rec.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_profile_request(
    conn: &mut PgConnection,
    rec: &ProfileRequestRecord,
) -> Result<(), DbError> {
    let p = &rec.proposal;
    sqlx::query(
        "INSERT INTO profile_requests
            (id, user_id, identity_id, status, full_name, date_of_birth, identity_type,
             identity_fingerprint, photo_path, proof_document, reviewer_id, reviewer_comment,
             created_at, reviewed_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
         ON CONFLICT (id) DO UPDATE SET
            status = EXCLUDED.status,
            reviewer_id = EXCLUDED.reviewer_id,
            reviewer_comment = EXCLUDED.reviewer_comment,
            reviewed_at = EXCLUDED.reviewed_at",
    )
    .bind(*rec.id.as_uuid())
    .bind(*rec.user_id.as_uuid())
    .bind(*rec.identity_id.as_uuid())
    .bind(rec.status.as_str())
    .bind(p.full_name.as_deref())
    .bind(p.date_of_birth)
    .bind(p.identity_type.map(|t| t.as_str()))
    .bind(p.identity_fingerprint.as_ref().map(|fp| fp.as_str()))
    .bind(p.photo_path.as_deref())
    .bind(rec.proof_document.as_deref())
    .bind(rec.reviewer.map(|id| *id.as_uuid()))
    .bind(rec.reviewer_comment.as_deref())
    .bind(rec.created_at)
    .bind(rec.reviewed_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
