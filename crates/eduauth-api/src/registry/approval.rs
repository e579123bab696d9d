//! # Account & Approval
//!
//! Role-specific behavior lives behind [`RoleAccount`], implemented once per
//! member of the closed [`Account`] set. Services load an [`Account`] and
//! call through the trait instead of branching on the role string.
//!
//! Approval is idempotent. A repeated approval reports
//! [`ApprovalOutcome::AlreadyApproved`], writes nothing, and sends no
//! notification.

use chrono::{DateTime, NaiveDate, Utc};
use eduauth_core::{Email, IdentityType, InstitutionId, InstitutionType, Role, StudentId, UserId};
use eduauth_state::{AccountStatus, ApprovalStatus, Transition};
use serde::Serialize;
use utoipa::ToSchema;

use super::error::RegistryError;
use super::ledger::{Tables, Transaction};
use super::records::{
    InstitutionRecord, StudentIdentityRecord, StudentProfileRecord, UserRecord, VerificationStamp,
};
use super::Registry;
use crate::notify::{Notification, NotificationKind};

/// The authenticated caller as resolved from the authoritative tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    #[schema(value_type = String)]
    pub user_id: UserId,
    #[schema(value_type = String)]
    pub email: Email,
    #[schema(value_type = String)]
    pub role: Role,
    #[schema(value_type = String)]
    pub status: AccountStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub institution_id: Option<InstitutionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_issue: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub student_id: Option<StudentId>,
}

/// An entry in the admin's pending queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PendingAccount {
    #[schema(value_type = String)]
    pub user_id: UserId,
    #[schema(value_type = String)]
    pub email: Email,
    #[schema(value_type = String)]
    pub role: Role,
    pub name: String,
    pub registered_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub identity_type: Option<IdentityType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub institution_type: Option<InstitutionType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_number: Option<String>,
}

/// An active institution as listed for the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstitutionListing {
    #[schema(value_type = String)]
    pub user_id: UserId,
    #[schema(value_type = String)]
    pub institution_id: InstitutionId,
    #[schema(value_type = String)]
    pub email: Email,
    pub name: String,
    #[schema(value_type = String)]
    pub institution_type: InstitutionType,
    pub registration_number: String,
    #[schema(value_type = String)]
    pub approval_status: ApprovalStatus,
    pub can_issue: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Approved,
    AlreadyApproved,
}

impl ApprovalOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Approved => "user approved",
            Self::AlreadyApproved => "user is already approved",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionOutcome {
    Rejected,
    AlreadyRejected,
}

impl RejectionOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Rejected => "user rejected",
            Self::AlreadyRejected => "user is already rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionOutcome {
    pub can_issue: bool,
    pub changed: bool,
}

impl PermissionOutcome {
    pub fn message(&self) -> &'static str {
        match (self.changed, self.can_issue) {
            (false, _) => "issuance permission already set",
            (true, true) => "issuance permission granted",
            (true, false) => "issuance permission revoked",
        }
    }
}

// -- Role accounts ------------------------------------------------------------

/// The role-specific slice of the approval machine.
pub trait RoleAccount {
    fn user(&self) -> &UserRecord;

    /// The name shown to admins and used in notifications.
    fn display_name(&self) -> &str;

    fn principal(&self) -> Principal;

    fn pending_view(&self) -> PendingAccount;

    /// Write the approval. Returns whether anything changed.
    fn apply_approval(
        &self,
        tx: &mut Transaction,
        admin: UserId,
        at: DateTime<Utc>,
    ) -> Result<bool, RegistryError>;

    /// Belongs in the pending queue.
    fn awaits_review(&self) -> bool {
        self.user().status == AccountStatus::Pending
    }

    /// Gate applied at login, after the password has been checked.
    fn check_sign_in(&self) -> Result<(), RegistryError> {
        let status = self.user().status;
        if status.can_sign_in() {
            Ok(())
        } else {
            Err(RegistryError::forbidden(format!(
                "account is {status}; please wait for admin approval"
            )))
        }
    }

    /// Write the rejection. Returns whether anything changed.
    fn apply_rejection(&self, tx: &mut Transaction, at: DateTime<Utc>) -> Result<bool, RegistryError> {
        match self.user().status.reject()? {
            Transition::Unchanged(_) => Ok(false),
            Transition::Changed { to, .. } => {
                tx.put_user(with_status(self.user(), to, at))?;
                Ok(true)
            }
        }
    }
}

fn with_status(user: &UserRecord, status: AccountStatus, at: DateTime<Utc>) -> UserRecord {
    UserRecord {
        status,
        updated_at: at,
        ..user.clone()
    }
}

fn base_principal(user: &UserRecord) -> Principal {
    Principal {
        user_id: user.id,
        email: user.email.clone(),
        role: user.role,
        status: user.status,
        institution_id: None,
        can_issue: None,
        student_id: None,
    }
}

fn base_pending(user: &UserRecord, name: &str) -> PendingAccount {
    PendingAccount {
        user_id: user.id,
        email: user.email.clone(),
        role: user.role,
        name: name.to_string(),
        registered_at: user.created_at,
        date_of_birth: None,
        identity_type: None,
        photo_path: None,
        institution_type: None,
        registration_number: None,
    }
}

#[derive(Debug, Clone)]
pub struct StudentAccount {
    pub user: UserRecord,
    pub identity: StudentIdentityRecord,
    pub profile: StudentProfileRecord,
}

impl RoleAccount for StudentAccount {
    fn user(&self) -> &UserRecord {
        &self.user
    }

    fn display_name(&self) -> &str {
        &self.identity.full_name
    }

    fn principal(&self) -> Principal {
        Principal {
            student_id: Some(self.profile.id),
            ..base_principal(&self.user)
        }
    }

    fn pending_view(&self) -> PendingAccount {
        PendingAccount {
            date_of_birth: Some(self.identity.date_of_birth),
            identity_type: Some(self.identity.identity_type),
            photo_path: Some(self.profile.photo_path.clone()),
            ..base_pending(&self.user, &self.identity.full_name)
        }
    }

    fn apply_approval(
        &self,
        tx: &mut Transaction,
        admin: UserId,
        at: DateTime<Utc>,
    ) -> Result<bool, RegistryError> {
        match self.user.status.approve()? {
            Transition::Unchanged(_) => Ok(false),
            Transition::Changed { to, .. } => {
                tx.put_user(with_status(&self.user, to, at))?;
                tx.put_identity(StudentIdentityRecord {
                    verified: Some(VerificationStamp { by: admin, at }),
                    updated_at: at,
                    ..self.identity.clone()
                })?;
                Ok(true)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct InstitutionAccount {
    pub user: UserRecord,
    pub institution: InstitutionRecord,
}

impl RoleAccount for InstitutionAccount {
    fn user(&self) -> &UserRecord {
        &self.user
    }

    fn display_name(&self) -> &str {
        &self.institution.name
    }

    fn principal(&self) -> Principal {
        Principal {
            institution_id: Some(self.institution.id),
            can_issue: Some(self.institution.can_issue),
            ..base_principal(&self.user)
        }
    }

    fn pending_view(&self) -> PendingAccount {
        PendingAccount {
            institution_type: Some(self.institution.institution_type),
            registration_number: Some(self.institution.registration_number.clone()),
            ..base_pending(&self.user, &self.institution.name)
        }
    }

    fn awaits_review(&self) -> bool {
        self.institution.standing(self.user.status).awaits_review()
    }

    fn check_sign_in(&self) -> Result<(), RegistryError> {
        let status = self.user.status;
        if !status.can_sign_in() {
            return Err(RegistryError::forbidden(format!(
                "account is {status}; please wait for admin approval"
            )));
        }
        if self.institution.approval != ApprovalStatus::Approved {
            return Err(RegistryError::forbidden(
                "institution is not yet approved by the registry authority",
            ));
        }
        Ok(())
    }

    fn apply_approval(
        &self,
        tx: &mut Transaction,
        admin: UserId,
        at: DateTime<Utc>,
    ) -> Result<bool, RegistryError> {
        match self.institution.standing(self.user.status).approve()? {
            Transition::Unchanged(_) => Ok(false),
            Transition::Changed { to, .. } => {
                if to.account != self.user.status {
                    tx.put_user(with_status(&self.user, to.account, at))?;
                }
                tx.put_institution(InstitutionRecord {
                    approval: to.approval,
                    can_issue: to.can_issue,
                    verified: Some(VerificationStamp { by: admin, at }),
                    updated_at: at,
                    ..self.institution.clone()
                })?;
                Ok(true)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdminAccount {
    pub user: UserRecord,
}

impl RoleAccount for AdminAccount {
    fn user(&self) -> &UserRecord {
        &self.user
    }

    fn display_name(&self) -> &str {
        self.user.email.as_str()
    }

    fn principal(&self) -> Principal {
        base_principal(&self.user)
    }

    fn pending_view(&self) -> PendingAccount {
        base_pending(&self.user, self.user.email.as_str())
    }

    fn apply_approval(
        &self,
        tx: &mut Transaction,
        _admin: UserId,
        at: DateTime<Utc>,
    ) -> Result<bool, RegistryError> {
        match self.user.status.approve()? {
            Transition::Unchanged(_) => Ok(false),
            Transition::Changed { to, .. } => {
                tx.put_user(with_status(&self.user, to, at))?;
                Ok(true)
            }
        }
    }
}

/// A user together with its role record.
#[derive(Debug, Clone)]
pub enum Account {
    Student(StudentAccount),
    Institution(InstitutionAccount),
    Admin(AdminAccount),
}

impl Account {
    /// Load the account for `user_id`.
    pub fn load(tables: &Tables, user_id: UserId) -> Result<Self, RegistryError> {
        let user = tables
            .user(user_id)
            .cloned()
            .ok_or_else(|| RegistryError::not_found("user not found"))?;
        Self::from_user(tables, user)
    }

    /// Attach the role record to `user`.
    ///
    /// A student without identity and profile, or an institution without its
    /// institution row, is a storage inconsistency.
    pub fn from_user(tables: &Tables, user: UserRecord) -> Result<Self, RegistryError> {
        match user.role {
            Role::Student => {
                let identity = tables.identity_by_user(user.id).cloned();
                let profile = tables.profile_by_user(user.id).cloned();
                match (identity, profile) {
                    (Some(identity), Some(profile)) => Ok(Self::Student(StudentAccount {
                        user,
                        identity,
                        profile,
                    })),
                    _ => Err(incomplete(&user)),
                }
            }
            Role::Institution => match tables.institution_by_user(user.id).cloned() {
                Some(institution) => Ok(Self::Institution(InstitutionAccount { user, institution })),
                None => Err(incomplete(&user)),
            },
            Role::Admin => Ok(Self::Admin(AdminAccount { user })),
        }
    }

    pub fn as_role(&self) -> &dyn RoleAccount {
        match self {
            Self::Student(a) => a,
            Self::Institution(a) => a,
            Self::Admin(a) => a,
        }
    }
}

fn incomplete(user: &UserRecord) -> RegistryError {
    tracing::error!(user_id = %user.id, role = %user.role, "account has no role record");
    RegistryError::Persistence(format!("{} account {} has no role record", user.role, user.id))
}

// -- Services -----------------------------------------------------------------

impl Registry {
    /// Pending accounts of one kind, oldest first.
    ///
    /// Only students and institutions queue for review.
    pub fn list_pending(&self, kind: Role) -> Result<Vec<PendingAccount>, RegistryError> {
        if !kind.is_self_registrable() {
            return Err(RegistryError::validation(
                "type must be 'student' or 'institution'",
            ));
        }
        let mut pending: Vec<PendingAccount> = self.ledger.read(|t| {
            t.users()
                .filter(|u| u.role == kind && u.status == AccountStatus::Pending)
                .filter_map(|u| Account::from_user(t, u.clone()).ok())
                .filter(|a| a.as_role().awaits_review())
                .map(|a| a.as_role().pending_view())
                .collect()
        });
        pending.sort_by_key(|p| p.registered_at);
        Ok(pending)
    }

    /// Active institutions, by name.
    pub fn list_active_institutions(&self) -> Vec<InstitutionListing> {
        let mut listed: Vec<InstitutionListing> = self.ledger.read(|t| {
            t.institutions()
                .filter_map(|i| {
                    let user = t.user(i.user_id)?;
                    (user.status == AccountStatus::Active).then(|| InstitutionListing {
                        user_id: user.id,
                        institution_id: i.id,
                        email: user.email.clone(),
                        name: i.name.clone(),
                        institution_type: i.institution_type,
                        registration_number: i.registration_number.clone(),
                        approval_status: i.approval,
                        can_issue: i.can_issue,
                    })
                })
                .collect()
        });
        listed.sort_by(|a, b| a.name.cmp(&b.name));
        listed
    }

    /// Approve a pending account.
    pub async fn approve(
        &self,
        user_id: UserId,
        admin: UserId,
    ) -> Result<ApprovalOutcome, RegistryError> {
        let at = self.now();
        let approved = self
            .ledger
            .transact("approve_user", move |tx| {
                let account = Account::load(tx.tables(), user_id)?;
                let role = account.as_role();
                let changed = role.apply_approval(tx, admin, at)?;
                Ok(changed.then(|| {
                    (
                        role.user().email.clone(),
                        role.display_name().to_string(),
                        role.user().role,
                    )
                }))
            })
            .await?;

        let Some((email, name, role)) = approved else {
            tracing::info!(%user_id, "approval repeated; nothing to do");
            return Ok(ApprovalOutcome::AlreadyApproved);
        };
        tracing::info!(%user_id, %admin, %role, "account approved");
        self.notify(Notification::new(
            email,
            NotificationKind::AccountApproved { name, role },
        ));
        Ok(ApprovalOutcome::Approved)
    }

    /// Reject a pending account.
    pub async fn reject_user(
        &self,
        user_id: UserId,
        admin: UserId,
    ) -> Result<RejectionOutcome, RegistryError> {
        let at = self.now();
        let changed = self
            .ledger
            .transact("reject_user", move |tx| {
                let account = Account::load(tx.tables(), user_id)?;
                account.as_role().apply_rejection(tx, at)
            })
            .await?;
        if changed {
            tracing::info!(%user_id, %admin, "account rejected");
            Ok(RejectionOutcome::Rejected)
        } else {
            Ok(RejectionOutcome::AlreadyRejected)
        }
    }

    /// Grant or revoke an institution's issuance permission.
    ///
    /// `target` is the owning user's id or the institution id. The flag is
    /// independent of approval and may be set at any time.
    pub async fn set_issuance_permission(
        &self,
        target: uuid::Uuid,
        can_issue: bool,
    ) -> Result<PermissionOutcome, RegistryError> {
        let at = self.now();
        let changed = self
            .ledger
            .transact("set_issuance_permission", move |tx| {
                let tables = tx.tables();
                let institution = tables
                    .institution_by_user(UserId::from_uuid(target))
                    .or_else(|| tables.institution(InstitutionId::from_uuid(target)))
                    .cloned()
                    .ok_or_else(|| RegistryError::not_found("institution not found"))?;
                let owner = tables
                    .user(institution.user_id)
                    .cloned()
                    .ok_or_else(|| incomplete_institution(&institution))?;

                match institution.standing(owner.status).set_issuance(can_issue) {
                    Transition::Unchanged(_) => Ok(None),
                    Transition::Changed { to, .. } => {
                        let name = institution.name.clone();
                        tx.put_institution(InstitutionRecord {
                            can_issue: to.can_issue,
                            updated_at: at,
                            ..institution
                        })?;
                        Ok(Some((owner.email, name)))
                    }
                }
            })
            .await?;

        let Some((email, institution_name)) = changed else {
            return Ok(PermissionOutcome {
                can_issue,
                changed: false,
            });
        };
        tracing::info!(%target, can_issue, "issuance permission changed");
        self.notify(Notification::new(
            email,
            NotificationKind::IssuancePermissionChanged {
                institution_name,
                can_issue,
            },
        ));
        Ok(PermissionOutcome {
            can_issue,
            changed: true,
        })
    }
}

fn incomplete_institution(institution: &InstitutionRecord) -> RegistryError {
    tracing::error!(institution_id = %institution.id, "institution has no owning user");
    RegistryError::Persistence(format!("institution {} has no owning user", institution.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotifier;
    use crate::registry::testing::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn approving_student_activates_and_stamps_identity() {
        let f = fixture().await;
        let acc = f
            .registry
            .register(student_registration("s@example.org", NID))
            .await
            .unwrap();
        let outcome = f.registry.approve(acc.user_id, f.admin).await.unwrap();
        assert_eq!(outcome, ApprovalOutcome::Approved);

        let snapshot = f.registry.ledger().snapshot();
        assert_eq!(snapshot.user(acc.user_id).unwrap().status, AccountStatus::Active);
        let stamp = snapshot.identity_by_user(acc.user_id).unwrap().verified.unwrap();
        assert_eq!(stamp.by, f.admin);
        assert_eq!(f.notifier.count_of("account_approved"), 1);
    }

    #[tokio::test]
    async fn approving_institution_enables_issuance() {
        let f = fixture().await;
        let principal = f.active_institution("inst@example.org").await;
        assert_eq!(principal.can_issue, Some(true));
        let snapshot = f.registry.ledger().snapshot();
        let inst = snapshot.institution_by_user(principal.user_id).unwrap();
        assert_eq!(inst.approval, ApprovalStatus::Approved);
        assert!(inst.verified.is_some());
    }

    #[tokio::test]
    async fn repeated_approval_is_a_quiet_success() {
        let f = fixture().await;
        let user = f.active_student("s@example.org", NID).await;
        let before = f.registry.ledger().snapshot();

        let outcome = f.registry.approve(user, f.admin).await.unwrap();
        assert_eq!(outcome, ApprovalOutcome::AlreadyApproved);
        assert_eq!(f.notifier.count_of("account_approved"), 1);
        assert_eq!(
            before.identity_by_user(user),
            f.registry.ledger().snapshot().identity_by_user(user)
        );
    }

    #[tokio::test]
    async fn approving_unknown_user_is_not_found() {
        let f = fixture().await;
        let err = f.registry.approve(UserId::new(), f.admin).await.unwrap_err();
        assert_eq!(err, RegistryError::NotFound("user not found".into()));
    }

    #[tokio::test]
    async fn notifier_failure_does_not_fail_approval() {
        let f = fixture_with(Arc::new(RecordingNotifier::failing())).await;
        let acc = f
            .registry
            .register(student_registration("s@example.org", NID))
            .await
            .unwrap();
        assert_eq!(
            f.registry.approve(acc.user_id, f.admin).await.unwrap(),
            ApprovalOutcome::Approved
        );
        assert_eq!(f.notifier.count_of("account_approved"), 1);
    }

    #[tokio::test]
    async fn rejection_is_idempotent_and_final() {
        let f = fixture().await;
        let acc = f
            .registry
            .register(student_registration("s@example.org", NID))
            .await
            .unwrap();
        assert_eq!(
            f.registry.reject_user(acc.user_id, f.admin).await.unwrap(),
            RejectionOutcome::Rejected
        );
        assert_eq!(
            f.registry.reject_user(acc.user_id, f.admin).await.unwrap(),
            RejectionOutcome::AlreadyRejected
        );
        let err = f.registry.approve(acc.user_id, f.admin).await.unwrap_err();
        assert!(matches!(err, RegistryError::Conflict(_)));
        assert!(f.registry.list_pending(Role::Student).unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejecting_active_account_conflicts() {
        let f = fixture().await;
        let user = f.active_student("s@example.org", NID).await;
        let err = f.registry.reject_user(user, f.admin).await.unwrap_err();
        assert!(matches!(err, RegistryError::Conflict(_)));
    }

    #[tokio::test]
    async fn pending_queue_filters_by_kind() {
        let f = fixture().await;
        f.registry
            .register(student_registration("s@example.org", NID))
            .await
            .unwrap();
        f.registry
            .register(institution_registration("i@example.org"))
            .await
            .unwrap();

        let students = f.registry.list_pending(Role::Student).unwrap();
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].name, "Nusrat Jahan");
        assert!(students[0].date_of_birth.is_some());

        let institutions = f.registry.list_pending(Role::Institution).unwrap();
        assert_eq!(institutions.len(), 1);
        assert_eq!(institutions[0].registration_number.as_deref(), Some("DU-1921"));

        assert!(matches!(
            f.registry.list_pending(Role::Admin),
            Err(RegistryError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn approved_institution_leaves_queue() {
        let f = fixture().await;
        f.active_institution("i@example.org").await;
        assert!(f.registry.list_pending(Role::Institution).unwrap().is_empty());
        assert_eq!(f.registry.list_active_institutions().len(), 1);
    }

    #[tokio::test]
    async fn issuance_permission_toggles_once_per_change() {
        let f = fixture().await;
        let inst = f.active_institution("i@example.org").await;
        let target = *inst.user_id.as_uuid();

        let off = f.registry.set_issuance_permission(target, false).await.unwrap();
        assert!(off.changed);
        let again = f.registry.set_issuance_permission(target, false).await.unwrap();
        assert!(!again.changed);
        assert_eq!(again.message(), "issuance permission already set");
        assert_eq!(f.notifier.count_of("issuance_permission_changed"), 1);
        assert_eq!(f.principal(inst.user_id).can_issue, Some(false));
    }

    #[tokio::test]
    async fn permission_addressable_by_institution_id() {
        let f = fixture().await;
        let inst = f.active_institution("i@example.org").await;
        let by_institution = *inst.institution_id.unwrap().as_uuid();
        let out = f
            .registry
            .set_issuance_permission(by_institution, false)
            .await
            .unwrap();
        assert!(out.changed);
    }

    #[tokio::test]
    async fn permission_may_be_set_before_approval() {
        let f = fixture().await;
        let acc = f
            .registry
            .register(institution_registration("i@example.org"))
            .await
            .unwrap();
        let out = f
            .registry
            .set_issuance_permission(*acc.user_id.as_uuid(), true)
            .await
            .unwrap();
        assert!(out.changed);
        let snapshot = f.registry.ledger().snapshot();
        let inst = snapshot.institution_by_user(acc.user_id).unwrap();
        assert!(inst.can_issue);
        assert_eq!(inst.approval, ApprovalStatus::Pending);
    }

    #[tokio::test]
    async fn permission_for_unknown_institution_is_not_found() {
        let f = fixture().await;
        let err = f
            .registry
            .set_issuance_permission(uuid::Uuid::new_v4(), true)
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::NotFound("institution not found".into()));
    }
}
