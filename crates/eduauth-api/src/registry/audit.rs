//! # Verification Audit Trail
//!
//! Every successful public lookup leaves a [`VerificationLogRecord`]. The
//! trail is write-only from the registry's point of view and sits outside
//! the [`Ledger`](super::Ledger): appending never takes the writer lock and
//! never copies a table.
//!
//! An append must return immediately. A failure is reported to the caller,
//! which logs it and carries on.

use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;
use sqlx::PgPool;
use thiserror::Error;

use super::records::VerificationLogRecord;

/// Entries kept by [`MemoryVerificationLog`] before the oldest are dropped.
pub const DEFAULT_MEMORY_LOG_CAPACITY: usize = 10_000;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("no async runtime available to write verification log")]
    NoRuntime,
    #[error("verification log unavailable: {0}")]
    Unavailable(String),
}

/// Sink for verification log entries. Implementations must not block.
pub trait VerificationLog: Send + Sync + fmt::Debug {
    fn append(&self, entry: VerificationLogRecord) -> Result<(), AuditError>;
}

/// Keeps the most recent entries in a bounded ring buffer.
#[derive(Debug)]
pub struct MemoryVerificationLog {
    entries: Mutex<VecDeque<VerificationLogRecord>>,
    capacity: usize,
}

impl MemoryVerificationLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Retained entries, oldest first.
    pub fn entries(&self) -> Vec<VerificationLogRecord> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for MemoryVerificationLog {
    fn default() -> Self {
        Self::new()
    }
}

impl VerificationLog for MemoryVerificationLog {
    fn append(&self, entry: VerificationLogRecord) -> Result<(), AuditError> {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
        Ok(())
    }
}

/// Inserts each entry into the `verification_logs` table on a spawned task.
#[derive(Debug, Clone)]
pub struct PgVerificationLog {
    pool: PgPool,
}

impl PgVerificationLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl VerificationLog for PgVerificationLog {
    fn append(&self, entry: VerificationLogRecord) -> Result<(), AuditError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| AuditError::NoRuntime)?;
        let pool = self.pool.clone();
        handle.spawn(async move {
            if let Err(e) = crate::db::audit::insert_verification_log(&pool, &entry).await {
                tracing::warn!(
                    certificate_id = %entry.certificate_id,
                    error = %e,
                    "verification log insert failed"
                );
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use eduauth_core::CertificateId;
    use uuid::Uuid;

    fn entry() -> VerificationLogRecord {
        VerificationLogRecord {
            id: Uuid::new_v4(),
            certificate_id: CertificateId::new(),
            verifier_type: "public".into(),
            result: "valid".into(),
            verified_at: Utc::now(),
        }
    }

    #[test]
    fn memory_log_drops_oldest_past_capacity() {
        let log = MemoryVerificationLog::with_capacity(3);
        let written: Vec<_> = (0..5).map(|_| entry()).collect();
        for e in &written {
            log.append(e.clone()).unwrap();
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.entries(), written[2..].to_vec());
    }

    #[test]
    fn zero_capacity_still_keeps_the_latest_entry() {
        let log = MemoryVerificationLog::with_capacity(0);
        log.append(entry()).unwrap();
        let last = entry();
        log.append(last.clone()).unwrap();
        assert_eq!(log.entries(), vec![last]);
    }
}
