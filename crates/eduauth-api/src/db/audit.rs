//! Verification log rows.
//!
//! The log is append-only and never read back into memory.

use sqlx::PgPool;

use super::DbError;
use crate::registry::records::VerificationLogRecord;

pub async fn insert_verification_log(
    pool: &PgPool,
    rec: &VerificationLogRecord,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO verification_logs (id, certificate_id, verifier_type, result, verified_at)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(rec.id)
    .bind(*rec.certificate_id.as_uuid())
    .bind(&rec.verifier_type)
    .bind(&rec.result)
    .bind(rec.verified_at)
    .execute(pool)
    .await?;
    Ok(())
}
