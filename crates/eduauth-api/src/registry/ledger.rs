//! # Ledger: Snapshot Tables with Atomic Transactions
//!
//! All registry state lives in one [`Tables`] value behind an
//! `Arc`. Readers take a cheap snapshot and never block writers. Each table
//! inside is its own `Arc`, so a transaction copies only the tables it
//! writes to.
//!
//! A write runs as [`Ledger::transact`]:
//!
//! 1. Writers are serialized by an async mutex.
//! 2. The closure runs against a private copy of the tables. Every write it
//!    makes is checked against the same uniqueness rules the database
//!    enforces and recorded as a [`Change`].
//! 3. If the closure fails, the copy is dropped. Nothing is observable.
//! 4. If a Postgres pool is attached, the change set is written in a single
//!    SQL transaction. A storage failure drops the copy too.
//! 5. Only then is the copy published as the new snapshot.
//!
//! The uniqueness checks here are the storage-level backstop. Services check
//! the same conditions first so they can report a specific conflict; a
//! violation that reaches this layer is a [`RegistryError::Persistence`].

use std::collections::HashMap;
use std::sync::Arc;

use eduauth_core::{
    CertificateFingerprint, CertificateId, Email, EnrollmentId, IdentityFingerprint, IdentityId,
    InstitutionId, ProfileRequestId, StudentId, UserId,
};
use eduauth_state::ReviewStatus;
use parking_lot::RwLock;
use sqlx::PgPool;

use super::error::RegistryError;
use super::records::{
    CertificateRecord, EnrollmentRecord, InstitutionRecord, ProfileRequestRecord,
    StudentIdentityRecord, StudentProfileRecord, UserRecord,
};

/// A single recorded write, replayed against Postgres on commit.
#[derive(Debug, Clone)]
pub enum Change {
    User(UserRecord),
    Identity(StudentIdentityRecord),
    Profile(StudentProfileRecord),
    Institution(InstitutionRecord),
    Enrollment(EnrollmentRecord),
    Certificate(CertificateRecord),
    ProfileRequest(ProfileRequestRecord),
}

/// Name of the violated uniqueness rule, matching the database constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniqueViolation(pub &'static str);

impl From<UniqueViolation> for RegistryError {
    fn from(v: UniqueViolation) -> Self {
        RegistryError::Persistence(format!("unique constraint violated: {}", v.0))
    }
}

/// Every registry table plus the secondary indexes backing unique lookups.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    users: Arc<HashMap<UserId, UserRecord>>,
    users_by_email: Arc<HashMap<Email, UserId>>,
    identities: Arc<HashMap<IdentityId, StudentIdentityRecord>>,
    identities_by_fingerprint: Arc<HashMap<IdentityFingerprint, IdentityId>>,
    profiles: Arc<HashMap<StudentId, StudentProfileRecord>>,
    institutions: Arc<HashMap<InstitutionId, InstitutionRecord>>,
    enrollments: Arc<HashMap<EnrollmentId, EnrollmentRecord>>,
    certificates: Arc<HashMap<CertificateId, CertificateRecord>>,
    certificates_by_fingerprint: Arc<HashMap<CertificateFingerprint, CertificateId>>,
    profile_requests: Arc<HashMap<ProfileRequestId, ProfileRequestRecord>>,
}

// -- Reads --------------------------------------------------------------------

impl Tables {
    pub fn user(&self, id: UserId) -> Option<&UserRecord> {
        self.users.get(&id)
    }

    pub fn user_by_email(&self, email: &Email) -> Option<&UserRecord> {
        self.users_by_email.get(email).and_then(|id| self.users.get(id))
    }

    pub fn users(&self) -> impl Iterator<Item = &UserRecord> {
        self.users.values()
    }

    pub fn identity(&self, id: IdentityId) -> Option<&StudentIdentityRecord> {
        self.identities.get(&id)
    }

    pub fn identity_by_user(&self, user_id: UserId) -> Option<&StudentIdentityRecord> {
        self.identities.values().find(|i| i.user_id == user_id)
    }

    pub fn identity_by_fingerprint(
        &self,
        fp: &IdentityFingerprint,
    ) -> Option<&StudentIdentityRecord> {
        self.identities_by_fingerprint
            .get(fp)
            .and_then(|id| self.identities.get(id))
    }

    pub fn profile(&self, id: StudentId) -> Option<&StudentProfileRecord> {
        self.profiles.get(&id)
    }

    pub fn profile_by_user(&self, user_id: UserId) -> Option<&StudentProfileRecord> {
        self.profiles.values().find(|p| p.user_id == user_id)
    }

    pub fn profile_by_identity(&self, identity_id: IdentityId) -> Option<&StudentProfileRecord> {
        self.profiles.values().find(|p| p.identity_id == identity_id)
    }

    pub fn institution(&self, id: InstitutionId) -> Option<&InstitutionRecord> {
        self.institutions.get(&id)
    }

    pub fn institution_by_user(&self, user_id: UserId) -> Option<&InstitutionRecord> {
        self.institutions.values().find(|i| i.user_id == user_id)
    }

    pub fn institutions(&self) -> impl Iterator<Item = &InstitutionRecord> {
        self.institutions.values()
    }

    pub fn enrollments_of(
        &self,
        institution_id: InstitutionId,
    ) -> impl Iterator<Item = &EnrollmentRecord> {
        self.enrollments
            .values()
            .filter(move |e| e.institution_id == institution_id)
    }

    pub fn enrollment_of(
        &self,
        institution_id: InstitutionId,
        student_id: StudentId,
    ) -> Option<&EnrollmentRecord> {
        self.enrollments_of(institution_id)
            .find(|e| e.student_id == student_id)
    }

    pub fn enrollment_by_local_id(
        &self,
        institution_id: InstitutionId,
        local_student_id: &str,
    ) -> Option<&EnrollmentRecord> {
        self.enrollments_of(institution_id)
            .find(|e| e.local_student_id == local_student_id)
    }

    pub fn certificate_by_fingerprint(
        &self,
        fp: &CertificateFingerprint,
    ) -> Option<&CertificateRecord> {
        self.certificates_by_fingerprint
            .get(fp)
            .and_then(|id| self.certificates.get(id))
    }

    pub fn certificates_of(&self, student_id: StudentId) -> impl Iterator<Item = &CertificateRecord> {
        self.certificates
            .values()
            .filter(move |c| c.student_id == student_id)
    }

    pub fn certificate_count(&self) -> usize {
        self.certificates.len()
    }

    pub fn profile_request(&self, id: ProfileRequestId) -> Option<&ProfileRequestRecord> {
        self.profile_requests.get(&id)
    }

    pub fn profile_requests(&self) -> impl Iterator<Item = &ProfileRequestRecord> {
        self.profile_requests.values()
    }

    pub fn pending_request_for(&self, user_id: UserId) -> Option<&ProfileRequestRecord> {
        self.profile_requests
            .values()
            .find(|r| r.user_id == user_id && r.status == ReviewStatus::Pending)
    }

    pub fn latest_request_for(&self, user_id: UserId) -> Option<&ProfileRequestRecord> {
        self.profile_requests
            .values()
            .filter(|r| r.user_id == user_id)
            .max_by_key(|r| r.created_at)
    }
}

// -- Checked writes -----------------------------------------------------------

impl Tables {
    pub(crate) fn upsert_user(&mut self, rec: UserRecord) -> Result<(), UniqueViolation> {
        if let Some(owner) = self.users_by_email.get(&rec.email) {
            if *owner != rec.id {
                return Err(UniqueViolation("users_email_key"));
            }
        }
        if let Some(old) = self.users.get(&rec.id) {
            if old.email != rec.email {
                Arc::make_mut(&mut self.users_by_email).remove(&old.email);
            }
        }
        Arc::make_mut(&mut self.users_by_email).insert(rec.email.clone(), rec.id);
        Arc::make_mut(&mut self.users).insert(rec.id, rec);
        Ok(())
    }

    pub(crate) fn upsert_identity(
        &mut self,
        rec: StudentIdentityRecord,
    ) -> Result<(), UniqueViolation> {
        if let Some(owner) = self.identities_by_fingerprint.get(&rec.identity_fingerprint) {
            if *owner != rec.id {
                return Err(UniqueViolation("student_identities_identity_fingerprint_key"));
            }
        }
        if let Some(old) = self.identities.get(&rec.id) {
            if old.identity_fingerprint != rec.identity_fingerprint {
                Arc::make_mut(&mut self.identities_by_fingerprint)
                    .remove(&old.identity_fingerprint);
            }
        }
        Arc::make_mut(&mut self.identities_by_fingerprint)
            .insert(rec.identity_fingerprint.clone(), rec.id);
        Arc::make_mut(&mut self.identities).insert(rec.id, rec);
        Ok(())
    }

    pub(crate) fn upsert_profile(&mut self, rec: StudentProfileRecord) -> Result<(), UniqueViolation> {
        if self
            .profiles
            .values()
            .any(|p| p.id != rec.id && (p.user_id == rec.user_id || p.identity_id == rec.identity_id))
        {
            return Err(UniqueViolation("student_profiles_identity_id_key"));
        }
        Arc::make_mut(&mut self.profiles).insert(rec.id, rec);
        Ok(())
    }

    pub(crate) fn upsert_institution(&mut self, rec: InstitutionRecord) -> Result<(), UniqueViolation> {
        if self
            .institutions
            .values()
            .any(|i| i.id != rec.id && i.user_id == rec.user_id)
        {
            return Err(UniqueViolation("institutions_user_id_key"));
        }
        Arc::make_mut(&mut self.institutions).insert(rec.id, rec);
        Ok(())
    }

    pub(crate) fn insert_enrollment(&mut self, rec: EnrollmentRecord) -> Result<(), UniqueViolation> {
        if self.enrollment_of(rec.institution_id, rec.student_id).is_some() {
            return Err(UniqueViolation("enrollments_institution_id_student_id_key"));
        }
        if self
            .enrollment_by_local_id(rec.institution_id, &rec.local_student_id)
            .is_some()
        {
            return Err(UniqueViolation(
                "enrollments_institution_id_local_student_id_key",
            ));
        }
        Arc::make_mut(&mut self.enrollments).insert(rec.id, rec);
        Ok(())
    }

    pub(crate) fn insert_certificate(&mut self, rec: CertificateRecord) -> Result<(), UniqueViolation> {
        if self.certificates_by_fingerprint.contains_key(&rec.fingerprint)
            || self.certificates.contains_key(&rec.id)
        {
            return Err(UniqueViolation("certificates_fingerprint_key"));
        }
        Arc::make_mut(&mut self.certificates_by_fingerprint)
            .insert(rec.fingerprint.clone(), rec.id);
        Arc::make_mut(&mut self.certificates).insert(rec.id, rec);
        Ok(())
    }

    pub(crate) fn upsert_profile_request(
        &mut self,
        rec: ProfileRequestRecord,
    ) -> Result<(), UniqueViolation> {
        if rec.status == ReviewStatus::Pending {
            if let Some(other) = self.pending_request_for(rec.user_id) {
                if other.id != rec.id {
                    return Err(UniqueViolation("profile_requests_one_pending"));
                }
            }
        }
        Arc::make_mut(&mut self.profile_requests).insert(rec.id, rec);
        Ok(())
    }
}

// -- Transaction --------------------------------------------------------------

/// A private working copy of the tables plus the writes made to it.
#[derive(Debug)]
pub struct Transaction {
    staged: Tables,
    changes: Vec<Change>,
}

impl Transaction {
    pub fn tables(&self) -> &Tables {
        &self.staged
    }

    pub fn put_user(&mut self, rec: UserRecord) -> Result<(), RegistryError> {
        self.staged.upsert_user(rec.clone())?;
        self.changes.push(Change::User(rec));
        Ok(())
    }

    pub fn put_identity(&mut self, rec: StudentIdentityRecord) -> Result<(), RegistryError> {
        self.staged.upsert_identity(rec.clone())?;
        self.changes.push(Change::Identity(rec));
        Ok(())
    }

    pub fn put_profile(&mut self, rec: StudentProfileRecord) -> Result<(), RegistryError> {
        self.staged.upsert_profile(rec.clone())?;
        self.changes.push(Change::Profile(rec));
        Ok(())
    }

    pub fn put_institution(&mut self, rec: InstitutionRecord) -> Result<(), RegistryError> {
        self.staged.upsert_institution(rec.clone())?;
        self.changes.push(Change::Institution(rec));
        Ok(())
    }

    pub fn insert_enrollment(&mut self, rec: EnrollmentRecord) -> Result<(), RegistryError> {
        self.staged.insert_enrollment(rec.clone())?;
        self.changes.push(Change::Enrollment(rec));
        Ok(())
    }

    pub fn insert_certificate(&mut self, rec: CertificateRecord) -> Result<(), RegistryError> {
        self.staged.insert_certificate(rec.clone())?;
        self.changes.push(Change::Certificate(rec));
        Ok(())
    }

    pub fn put_profile_request(&mut self, rec: ProfileRequestRecord) -> Result<(), RegistryError> {
        self.staged.upsert_profile_request(rec.clone())?;
        self.changes.push(Change::ProfileRequest(rec));
        Ok(())
    }
}

// -- Ledger -------------------------------------------------------------------

#[derive(Debug)]
struct LedgerInner {
    tables: RwLock<Arc<Tables>>,
    writer: tokio::sync::Mutex<()>,
    pool: Option<PgPool>,
}

/// Shared handle to the registry tables. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct Ledger {
    inner: Arc<LedgerInner>,
}

impl Ledger {
    /// A ledger that lives only in memory.
    pub fn in_memory() -> Self {
        Self::with_pool(None)
    }

    /// A ledger that writes through to Postgres when `pool` is set.
    pub fn with_pool(pool: Option<PgPool>) -> Self {
        Self {
            inner: Arc::new(LedgerInner {
                tables: RwLock::new(Arc::new(Tables::default())),
                writer: tokio::sync::Mutex::new(()),
                pool,
            }),
        }
    }

    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    /// The current committed snapshot.
    pub fn snapshot(&self) -> Arc<Tables> {
        Arc::clone(&self.inner.tables.read())
    }

    /// Run `f` against the current snapshot.
    pub fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> R {
        let snapshot = self.snapshot();
        f(&snapshot)
    }

    /// Run `f` as one atomic transaction. See the module docs.
    pub async fn transact<R, F>(&self, op: &'static str, f: F) -> Result<R, RegistryError>
    where
        F: FnOnce(&mut Transaction) -> Result<R, RegistryError> + Send,
        R: Send,
    {
        let _writer = self.inner.writer.lock().await;
        let base = self.snapshot();
        let mut tx = Transaction {
            staged: Tables::clone(&base),
            changes: Vec::new(),
        };

        let out = f(&mut tx)?;
        if tx.changes.is_empty() {
            return Ok(out);
        }

        if let Some(pool) = &self.inner.pool {
            crate::db::journal::persist(pool, &tx.changes)
                .await
                .map_err(|e| {
                    tracing::error!(op, error = %e, "transaction rolled back: storage write failed");
                    RegistryError::Persistence(format!("{op}: {e}"))
                })?;
        }

        *self.inner.tables.write() = Arc::new(tx.staged);
        tracing::debug!(op, changes = tx.changes.len(), "transaction committed");
        Ok(out)
    }

    /// Replace every table, e.g. after loading them from Postgres.
    pub async fn replace(&self, tables: Tables) {
        let _writer = self.inner.writer.lock().await;
        *self.inner.tables.write() = Arc::new(tables);
    }
}
