//! # Registry Engine
//!
//! The credential pipeline: account approval, enrollment, issuance, profile
//! change control and public verification. Every service is a method on
//! [`Registry`], which owns:
//!
//! - a [`Ledger`] holding the tables (optionally written through to Postgres),
//! - a [`Clock`] for audit timestamps and fingerprint salts,
//! - a [`Notifier`] for the fire-and-forget side channel,
//! - a [`VerificationLog`] for the audit trail of public lookups.
//!
//! ## Write discipline
//!
//! Each multi-step write runs inside one [`Ledger::transact`] call. All
//! preconditions are checked against the transaction's own view of the
//! tables, so a check and the write it guards can never interleave with
//! another writer. Notifications are sent only after `transact` returns `Ok`.

pub mod accounts;
pub mod approval;
pub mod audit;
pub mod enrollment;
pub mod error;
mod input;
pub mod issuance;
pub mod ledger;
pub mod profile;
pub mod records;
pub mod verification;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use eduauth_core::{Clock, SystemClock};
use tokio::sync::OnceCell;

use crate::db::DbError;
use crate::notify::{LogNotifier, Notification, Notifier};
use crate::password::PasswordPolicy;

pub use accounts::{
    InstitutionRegistration, RegisteredAccount, Registration, SeedOutcome, StudentRegistration,
};
pub use approval::{
    Account, ApprovalOutcome, InstitutionListing, PendingAccount, PermissionOutcome, Principal,
    RejectionOutcome, RoleAccount,
};
pub use audit::{MemoryVerificationLog, PgVerificationLog, VerificationLog};
pub use enrollment::{EnrolledStudent, EnrollmentFilter, NewEnrollment};
pub use error::RegistryError;
pub use issuance::{IssueRequest, IssuedCertificate};
pub use ledger::{Change, Ledger, Tables, Transaction};
pub use profile::{
    ContactUpdate, ProfileRequestSubmission, ProfileRequestView, ProposedChanges,
    StudentProfileView,
};
pub use verification::{CertificateSummary, OwnCertificate};

/// Default base URL for links in outbound notifications.
pub const DEFAULT_APP_BASE_URL: &str = "http://localhost:3000";

/// Handle to the registry. Cloning is cheap; clones share all state.
#[derive(Debug, Clone)]
pub struct Registry {
    ledger: Ledger,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    verification_log: Arc<dyn VerificationLog>,
    app_base_url: Arc<str>,
    password_policy: PasswordPolicy,
    /// Hash checked on sign-in attempts for unknown emails.
    decoy_hash: Arc<OnceCell<String>>,
}

impl Registry {
    /// The verification log goes to Postgres when `ledger` has a pool and
    /// to a bounded in-memory buffer otherwise.
    pub fn new(ledger: Ledger) -> Self {
        let verification_log: Arc<dyn VerificationLog> = match ledger.pool() {
            Some(pool) => Arc::new(PgVerificationLog::new(pool.clone())),
            None => Arc::new(MemoryVerificationLog::new()),
        };
        Self {
            ledger,
            clock: Arc::new(SystemClock::new()),
            notifier: Arc::new(LogNotifier),
            verification_log,
            app_base_url: Arc::from(DEFAULT_APP_BASE_URL),
            password_policy: PasswordPolicy::default(),
            decoy_hash: Arc::new(OnceCell::new()),
        }
    }

    /// A registry with no database behind it.
    pub fn in_memory() -> Self {
        Self::new(Ledger::in_memory())
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_verification_log(mut self, log: Arc<dyn VerificationLog>) -> Self {
        self.verification_log = log;
        self
    }

    pub fn with_app_base_url(mut self, base: impl AsRef<str>) -> Self {
        self.app_base_url = Arc::from(base.as_ref().trim_end_matches('/'));
        self
    }

    pub fn with_password_policy(mut self, policy: PasswordPolicy) -> Self {
        self.password_policy = policy;
        self
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Load every table from Postgres. A no-op without a pool.
    pub async fn hydrate(&self) -> Result<(), DbError> {
        let Some(pool) = self.ledger.pool() else {
            return Ok(());
        };
        let tables = crate::db::hydrate::load_tables(pool).await?;
        tracing::info!(
            users = tables.users().count(),
            certificates = tables.certificate_count(),
            "registry hydrated from database"
        );
        self.ledger.replace(tables).await;
        Ok(())
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn password_policy(&self) -> PasswordPolicy {
        self.password_policy
    }

    pub(crate) fn verify_url(&self, fingerprint: &str) -> String {
        format!("{}/verify/{fingerprint}", self.app_base_url)
    }

    pub(crate) fn verification_log(&self) -> &dyn VerificationLog {
        self.verification_log.as_ref()
    }

    /// Hand a notification to the side channel. Failures are logged only.
    pub(crate) fn notify(&self, notification: Notification) {
        if let Err(e) = self.notifier.send(&notification) {
            tracing::warn!(
                kind = notification.kind_name(),
                error = %e,
                "notification failed; operation result unaffected"
            );
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for the service tests.

    use std::sync::Arc;

    use chrono::NaiveDate;
    use eduauth_core::{Email, InstitutionType, UserId};
    use zeroize::Zeroizing;

    use super::*;
    use crate::notify::RecordingNotifier;

    pub const NID: &str = "1234567890";

    pub struct Fixture {
        pub registry: Registry,
        pub notifier: Arc<RecordingNotifier>,
        pub verifications: Arc<MemoryVerificationLog>,
        pub admin: UserId,
    }

    pub async fn fixture() -> Fixture {
        fixture_with(Arc::new(RecordingNotifier::new())).await
    }

    pub async fn fixture_with(notifier: Arc<RecordingNotifier>) -> Fixture {
        let verifications = Arc::new(MemoryVerificationLog::new());
        let registry = Registry::in_memory()
            .with_notifier(notifier.clone())
            .with_verification_log(verifications.clone())
            .with_password_policy(PasswordPolicy::minimal());
        let admin = match registry
            .seed_admin("admin@eduauth.test", "admin-password")
            .await
            .unwrap()
        {
            SeedOutcome::Created(id) | SeedOutcome::AlreadyExists(id) => id,
        };
        Fixture {
            registry,
            notifier,
            verifications,
            admin,
        }
    }

    pub fn student_registration(email: &str, nid: &str) -> Registration {
        Registration::Student(StudentRegistration {
            email: email.into(),
            password: Zeroizing::new("password123".to_string()),
            full_name: Some("Nusrat Jahan".into()),
            date_of_birth: Some("2001-05-04".into()),
            identity_type: None,
            identity_number: Some(nid.into()),
            photo_path: Some("/uploads/nusrat.jpg".into()),
        })
    }

    pub fn institution_registration(email: &str) -> Registration {
        Registration::Institution(InstitutionRegistration {
            email: email.into(),
            password: Zeroizing::new("password123".to_string()),
            institution_name: Some("Dhaka University".into()),
            institution_type: Some(InstitutionType::University.as_str().into()),
            registration_number: Some("DU-1921".into()),
        })
    }

    impl Fixture {
        /// Register and approve a student. Returns the user id.
        pub async fn active_student(&self, email: &str, nid: &str) -> UserId {
            let acc = self
                .registry
                .register(student_registration(email, nid))
                .await
                .unwrap();
            self.registry.approve(acc.user_id, self.admin).await.unwrap();
            acc.user_id
        }

        /// Register and approve an institution. Returns its principal.
        pub async fn active_institution(&self, email: &str) -> Principal {
            let acc = self
                .registry
                .register(institution_registration(email))
                .await
                .unwrap();
            self.registry.approve(acc.user_id, self.admin).await.unwrap();
            self.registry.resolve_principal(acc.user_id).unwrap()
        }

        pub fn principal(&self, user_id: UserId) -> Principal {
            self.registry.resolve_principal(user_id).unwrap()
        }

        pub fn email(raw: &str) -> Email {
            Email::parse(raw).unwrap()
        }
    }

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }
}
