//! # Registration, Sign-in and Principal Resolution
//!
//! Registration validates everything it can before hashing the password,
//! then re-checks uniqueness inside the transaction that creates the rows.
//! A new account is always `pending`.

use std::fmt;

use eduauth_core::{
    parse_calendar_date, Email, IdentityFingerprint, IdentityId, IdentityType, InstitutionId,
    InstitutionType, Role, StudentId, UserId, ValidationError,
};
use eduauth_state::{AccountStatus, ApprovalStatus};
use serde::Serialize;
use utoipa::ToSchema;
use zeroize::Zeroizing;

use super::approval::{Account, Principal};
use super::error::RegistryError;
use super::input::{bounded, optional, required};
use super::ledger::Tables;
use super::records::{InstitutionRecord, StudentIdentityRecord, StudentProfileRecord, UserRecord};
use super::Registry;
use crate::password::{self, MIN_PASSWORD_LEN};

const MAX_NAME_LEN: usize = 200;

/// Self-registration input. Field presence is checked here, not by serde.
pub enum Registration {
    Student(StudentRegistration),
    Institution(InstitutionRegistration),
}

impl Registration {
    fn email(&self) -> &str {
        match self {
            Self::Student(s) => &s.email,
            Self::Institution(i) => &i.email,
        }
    }

    fn password(&self) -> &str {
        match self {
            Self::Student(s) => &s.password,
            Self::Institution(i) => &i.password,
        }
    }
}

pub struct StudentRegistration {
    pub email: String,
    pub password: Zeroizing<String>,
    pub full_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub identity_type: Option<String>,
    pub identity_number: Option<String>,
    pub photo_path: Option<String>,
}

pub struct InstitutionRegistration {
    pub email: String,
    pub password: Zeroizing<String>,
    pub institution_name: Option<String>,
    pub institution_type: Option<String>,
    pub registration_number: Option<String>,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = match self {
            Self::Student(_) => Role::Student,
            Self::Institution(_) => Role::Institution,
        };
        f.debug_struct("Registration")
            .field("role", &role)
            .field("email", &self.email())
            .field("password", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// The account created by a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredAccount {
    #[schema(value_type = String)]
    pub user_id: UserId,
    #[schema(value_type = String)]
    pub role: Role,
    #[schema(value_type = String)]
    pub status: AccountStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub student_id: Option<StudentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub institution_id: Option<InstitutionId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    Created(UserId),
    AlreadyExists(UserId),
}

/// A registration whose fields have all been checked.
enum Draft {
    Student {
        full_name: String,
        date_of_birth: chrono::NaiveDate,
        identity_type: IdentityType,
        fingerprint: IdentityFingerprint,
        photo_path: String,
    },
    Institution {
        name: String,
        institution_type: InstitutionType,
        registration_number: String,
    },
}

impl Draft {
    fn role(&self) -> Role {
        match self {
            Self::Student { .. } => Role::Student,
            Self::Institution { .. } => Role::Institution,
        }
    }
}

fn check_password(password: &str) -> Result<(), RegistryError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(RegistryError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn draft(registration: &Registration) -> Result<Draft, ValidationError> {
    match registration {
        Registration::Student(s) => {
            let full_name = bounded(
                "fullName",
                required("fullName", s.full_name.as_deref())?,
                MAX_NAME_LEN,
            )?;
            let dob_raw = required("dateOfBirth", s.date_of_birth.as_deref())?;
            let date_of_birth = parse_calendar_date("dateOfBirth", &dob_raw)?;
            let identity_type = match optional(s.identity_type.as_deref()) {
                Some(raw) => raw.parse()?,
                None => IdentityType::default(),
            };
            let fingerprint = IdentityFingerprint::of_optional(s.identity_number.as_deref())
                .ok_or(ValidationError::MissingField {
                    field: "identityNumber",
                })?;
            let photo_path = required("photo", s.photo_path.as_deref())?;
            Ok(Draft::Student {
                full_name,
                date_of_birth,
                identity_type,
                fingerprint,
                photo_path,
            })
        }
        Registration::Institution(i) => {
            let name = bounded(
                "institutionName",
                required("institutionName", i.institution_name.as_deref())?,
                MAX_NAME_LEN,
            )?;
            let institution_type = match optional(i.institution_type.as_deref()) {
                Some(raw) => raw.parse()?,
                None => InstitutionType::default(),
            };
            let registration_number =
                required("registrationNumber", i.registration_number.as_deref())?;
            Ok(Draft::Institution {
                name,
                institution_type,
                registration_number,
            })
        }
    }
}

fn check_unique(tables: &Tables, email: &Email, draft: &Draft) -> Result<(), RegistryError> {
    if tables.user_by_email(email).is_some() {
        return Err(RegistryError::conflict("user already exists"));
    }
    if let Draft::Student { fingerprint, .. } = draft {
        if tables.identity_by_fingerprint(fingerprint).is_some() {
            return Err(RegistryError::conflict(
                "this identity number is already registered to another account",
            ));
        }
    }
    Ok(())
}

fn invalid_credentials() -> RegistryError {
    RegistryError::Authentication("invalid credentials".into())
}

impl Registry {
    /// Create a pending student or institution account.
    pub async fn register(
        &self,
        registration: Registration,
    ) -> Result<RegisteredAccount, RegistryError> {
        let email = Email::parse(registration.email())?;
        check_password(registration.password())?;
        let draft = draft(&registration)?;
        self.ledger.read(|t| check_unique(t, &email, &draft))?;

        let password = Zeroizing::new(registration.password().to_string());
        let password_hash = self.password_policy().hash(password).await.map_err(|e| {
            tracing::error!(error = %e, "password hashing failed");
            RegistryError::Persistence(e.to_string())
        })?;

        let at = self.now();
        let role = draft.role();
        let registered = self
            .ledger
            .transact("register", move |tx| {
                check_unique(tx.tables(), &email, &draft)?;
                let user = UserRecord {
                    id: UserId::new(),
                    email,
                    password_hash,
                    role,
                    status: AccountStatus::Pending,
                    created_at: at,
                    updated_at: at,
                };
                let user_id = user.id;
                tx.put_user(user)?;

                let mut out = RegisteredAccount {
                    user_id,
                    role,
                    status: AccountStatus::Pending,
                    student_id: None,
                    institution_id: None,
                };
                match draft {
                    Draft::Student {
                        full_name,
                        date_of_birth,
                        identity_type,
                        fingerprint,
                        photo_path,
                    } => {
                        let identity_id = IdentityId::new();
                        tx.put_identity(StudentIdentityRecord {
                            id: identity_id,
                            user_id,
                            full_name,
                            date_of_birth,
                            identity_type,
                            identity_fingerprint: fingerprint,
                            phone: None,
                            address: None,
                            verified: None,
                            updated_at: at,
                        })?;
                        let student_id = StudentId::new();
                        tx.put_profile(StudentProfileRecord {
                            id: student_id,
                            identity_id,
                            user_id,
                            photo_path,
                            updated_at: at,
                        })?;
                        out.student_id = Some(student_id);
                    }
                    Draft::Institution {
                        name,
                        institution_type,
                        registration_number,
                    } => {
                        let institution_id = InstitutionId::new();
                        tx.put_institution(InstitutionRecord {
                            id: institution_id,
                            user_id,
                            name,
                            institution_type,
                            registration_number,
                            approval: ApprovalStatus::Pending,
                            can_issue: false,
                            verified: None,
                            created_at: at,
                            updated_at: at,
                        })?;
                        out.institution_id = Some(institution_id);
                    }
                }
                Ok(out)
            })
            .await?;

        tracing::info!(user_id = %registered.user_id, %role, "account registered; awaiting approval");
        Ok(registered)
    }

    /// Check credentials and the role-specific sign-in gate.
    pub async fn authenticate(
        &self,
        email: &str,
        password: Zeroizing<String>,
    ) -> Result<Principal, RegistryError> {
        let email = Email::parse(email).map_err(|_| invalid_credentials())?;
        let Some(user) = self.ledger.read(|t| t.user_by_email(&email).cloned()) else {
            self.verify_decoy(password).await;
            tracing::warn!("sign-in for unknown email");
            return Err(invalid_credentials());
        };
        if !password::verify(password, user.password_hash.clone()).await {
            tracing::warn!(user_id = %user.id, "sign-in with wrong password");
            return Err(invalid_credentials());
        }

        let account = self.ledger.read(|t| Account::from_user(t, user))?;
        let role = account.as_role();
        role.check_sign_in()?;
        Ok(role.principal())
    }

    /// Run one password check against a throwaway hash so an unknown email
    /// takes as long to reject as a wrong password.
    async fn verify_decoy(&self, password: Zeroizing<String>) {
        let policy = self.password_policy();
        let decoy = self
            .decoy_hash
            .get_or_try_init(|| async move {
                policy.hash(Zeroizing::new("eduauth-decoy-password".to_string())).await
            })
            .await;
        match decoy {
            Ok(phc) => {
                password::verify(password, phc.clone()).await;
            }
            Err(e) => tracing::warn!(error = %e, "decoy password hash unavailable"),
        }
    }

    /// Re-read the principal behind a session.
    ///
    /// Fails when the account has vanished or is no longer active.
    pub fn resolve_principal(&self, user_id: UserId) -> Result<Principal, RegistryError> {
        self.ledger.read(|t| {
            let account = Account::load(t, user_id).map_err(|e| match e {
                RegistryError::NotFound(_) => {
                    RegistryError::Authentication("session account no longer exists".into())
                }
                other => other,
            })?;
            let status = account.as_role().user().status;
            if !status.can_sign_in() {
                return Err(RegistryError::forbidden(format!("account is {status}")));
            }
            Ok(account.as_role().principal())
        })
    }

    /// Create the bootstrap administrator if the email is unused.
    pub async fn seed_admin(&self, email: &str, password: &str) -> Result<SeedOutcome, RegistryError> {
        let email = Email::parse(email)?;
        check_password(password)?;
        if let Some(existing) = self.ledger.read(|t| t.user_by_email(&email).cloned()) {
            return existing_admin(&existing);
        }

        let password_hash = self
            .password_policy()
            .hash(Zeroizing::new(password.to_string()))
            .await
            .map_err(|e| RegistryError::Persistence(e.to_string()))?;
        let at = self.now();
        let outcome = self
            .ledger
            .transact("seed_admin", move |tx| {
                if let Some(existing) = tx.tables().user_by_email(&email) {
                    return existing_admin(existing);
                }
                let id = UserId::new();
                tx.put_user(UserRecord {
                    id,
                    email,
                    password_hash,
                    role: Role::Admin,
                    status: AccountStatus::Active,
                    created_at: at,
                    updated_at: at,
                })?;
                Ok(SeedOutcome::Created(id))
            })
            .await?;
        if let SeedOutcome::Created(id) = outcome {
            tracing::info!(user_id = %id, "administrator seeded");
        }
        Ok(outcome)
    }
}

fn existing_admin(user: &UserRecord) -> Result<SeedOutcome, RegistryError> {
    if user.role == Role::Admin {
        Ok(SeedOutcome::AlreadyExists(user.id))
    } else {
        Err(RegistryError::conflict(format!(
            "email is registered to a {} account",
            user.role
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::testing::*;

    fn pw(s: &str) -> Zeroizing<String> {
        Zeroizing::new(s.to_string())
    }

    #[tokio::test]
    async fn student_registration_stores_only_the_fingerprint() {
        let f = fixture().await;
        let acc = f
            .registry
            .register(student_registration("  Nusrat@Example.ORG ", NID))
            .await
            .unwrap();
        assert_eq!(acc.status, AccountStatus::Pending);
        assert!(acc.student_id.is_some());

        let snapshot = f.registry.ledger().snapshot();
        let user = snapshot.user(acc.user_id).unwrap();
        assert_eq!(user.email.as_str(), "nusrat@example.org");
        assert!(user.password_hash.starts_with("$argon2id$"));
        let identity = snapshot.identity_by_user(acc.user_id).unwrap();
        assert_eq!(
            identity.identity_fingerprint,
            IdentityFingerprint::of(NID).unwrap()
        );
        assert_eq!(identity.identity_type, IdentityType::Nid);
        assert!(identity.verified.is_none());
    }

    #[tokio::test]
    async fn institution_registration_starts_without_issuance() {
        let f = fixture().await;
        let acc = f
            .registry
            .register(institution_registration("i@example.org"))
            .await
            .unwrap();
        let snapshot = f.registry.ledger().snapshot();
        let inst = snapshot.institution_by_user(acc.user_id).unwrap();
        assert_eq!(inst.approval, ApprovalStatus::Pending);
        assert!(!inst.can_issue);
        assert_eq!(Some(inst.id), acc.institution_id);
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let f = fixture().await;
        f.registry
            .register(student_registration("s@example.org", NID))
            .await
            .unwrap();
        let err = f
            .registry
            .register(institution_registration("S@example.org"))
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::Conflict("user already exists".into()));
    }

    #[tokio::test]
    async fn duplicate_identity_number_conflicts() {
        let f = fixture().await;
        f.registry
            .register(student_registration("a@example.org", NID))
            .await
            .unwrap();
        let err = f
            .registry
            .register(student_registration("b@example.org", &format!(" {NID} ")))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::Conflict(
                "this identity number is already registered to another account".into()
            )
        );
    }

    #[tokio::test]
    async fn missing_student_fields_are_named() {
        let f = fixture().await;
        let mut reg = student_registration("a@example.org", "   ");
        let err = f.registry.register(reg).await.unwrap_err();
        assert_eq!(err, RegistryError::Validation("identityNumber is required".into()));

        reg = student_registration("a@example.org", NID);
        if let Registration::Student(s) = &mut reg {
            s.date_of_birth = Some("04/05/2001".into());
        }
        let err = f.registry.register(reg).await.unwrap_err();
        assert!(matches!(err, RegistryError::Validation(m) if m.starts_with("dateOfBirth")));
    }

    #[tokio::test]
    async fn short_password_rejected() {
        let f = fixture().await;
        let mut reg = institution_registration("i@example.org");
        if let Registration::Institution(i) = &mut reg {
            i.password = pw("short");
        }
        let err = f.registry.register(reg).await.unwrap_err();
        assert_eq!(
            err,
            RegistryError::Validation("password must be at least 8 characters".into())
        );
    }

    #[tokio::test]
    async fn unknown_institution_type_rejected() {
        let f = fixture().await;
        let mut reg = institution_registration("i@example.org");
        if let Registration::Institution(i) = &mut reg {
            i.institution_type = Some("academy".into());
        }
        assert!(matches!(
            f.registry.register(reg).await,
            Err(RegistryError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn pending_account_cannot_sign_in() {
        let f = fixture().await;
        f.registry
            .register(student_registration("s@example.org", NID))
            .await
            .unwrap();
        let err = f
            .registry
            .authenticate("s@example.org", pw("password123"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::Authorization(
                "account is pending; please wait for admin approval".into()
            )
        );
    }

    #[tokio::test]
    async fn sign_in_checks_password() {
        let f = fixture().await;
        let user = f.active_student("s@example.org", NID).await;
        let principal = f
            .registry
            .authenticate("S@EXAMPLE.ORG", pw("password123"))
            .await
            .unwrap();
        assert_eq!(principal.user_id, user);
        assert!(principal.student_id.is_some());

        for (email, password) in [("s@example.org", "wrong-pass"), ("nobody@example.org", "password123")] {
            let err = f.registry.authenticate(email, pw(password)).await.unwrap_err();
            assert_eq!(err, RegistryError::Authentication("invalid credentials".into()));
        }
    }

    #[tokio::test]
    async fn unknown_email_still_pays_for_a_password_check() {
        let f = fixture().await;
        assert!(!f.registry.decoy_hash.initialized());
        let err = f
            .registry
            .authenticate("nobody@example.org", pw("password123"))
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::Authentication("invalid credentials".into()));
        let decoy = f.registry.decoy_hash.get().unwrap();
        assert!(decoy.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn principal_resolution_tracks_status() {
        let f = fixture().await;
        let acc = f
            .registry
            .register(student_registration("s@example.org", NID))
            .await
            .unwrap();
        assert!(matches!(
            f.registry.resolve_principal(acc.user_id),
            Err(RegistryError::Authorization(_))
        ));
        assert!(matches!(
            f.registry.resolve_principal(UserId::new()),
            Err(RegistryError::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn seeding_admin_is_idempotent() {
        let f = fixture().await;
        let again = f
            .registry
            .seed_admin("admin@eduauth.test", "admin-password")
            .await
            .unwrap();
        assert_eq!(again, SeedOutcome::AlreadyExists(f.admin));
        let principal = f
            .registry
            .authenticate("admin@eduauth.test", pw("admin-password"))
            .await
            .unwrap();
        assert_eq!(principal.role, Role::Admin);
    }
}
