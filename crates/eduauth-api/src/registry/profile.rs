//! # Profile Change Control
//!
//! Two paths mutate a student's record:
//!
//! - **Direct**: phone and address, applied at once by the owner.
//! - **Proposal**: name, date of birth, identity type, identity number and
//!   photo. The student submits a request holding only the fields that
//!   actually differ; an admin approves or rejects it. Approval applies the
//!   proposal as a sparse patch in the same transaction that closes the
//!   request.
//!
//! At most one request per student is pending at any time.

use chrono::{DateTime, NaiveDate, Utc};
use eduauth_core::{
    parse_calendar_date, Email, IdentityFingerprint, IdentityId, IdentityType, ProfileRequestId,
    StudentId, UserId, ValidationError,
};
use eduauth_state::{touches_identity, AccountStatus, ProfileField, ReviewDecision, ReviewStatus};
use serde::Serialize;
use utoipa::ToSchema;

use super::error::RegistryError;
use super::input::{bounded, optional};
use super::ledger::{Tables, Transaction};
use super::records::{
    ProfileProposal, ProfileRequestRecord, StudentIdentityRecord, StudentProfileRecord,
    VerificationStamp,
};
use super::Registry;
use crate::notify::{Notification, NotificationKind};

const MAX_PHONE_LEN: usize = 32;
const MAX_ADDRESS_LEN: usize = 500;
const MAX_NAME_LEN: usize = 200;
const MAX_COMMENT_LEN: usize = 1000;

/// Direct contact update. `Some("")` clears a field; `None` leaves it.
#[derive(Debug, Clone, Default)]
pub struct ContactUpdate {
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Raw proposal input. Blank fields count as not proposed.
#[derive(Debug, Clone, Default)]
pub struct ProfileRequestSubmission {
    pub full_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub identity_type: Option<String>,
    pub identity_number: Option<String>,
    pub photo_path: Option<String>,
    pub proof_document: Option<String>,
}

/// The proposed values as shown to reviewers. The new identity number is
/// never shown, only whether it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProposedChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub identity_type: Option<IdentityType>,
    pub identity_number_changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRequestView {
    #[schema(value_type = String)]
    pub id: ProfileRequestId,
    #[schema(value_type = String)]
    pub user_id: UserId,
    pub student_name: String,
    #[schema(value_type = Option<String>)]
    pub email: Option<Email>,
    #[schema(value_type = String)]
    pub status: ReviewStatus,
    #[schema(value_type = Vec<String>)]
    pub fields: Vec<ProfileField>,
    pub proposed: ProposedChanges,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_document: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewer_comment: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// A student's own record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StudentProfileView {
    #[schema(value_type = String)]
    pub student_id: StudentId,
    #[schema(value_type = String)]
    pub email: Email,
    #[schema(value_type = String)]
    pub status: AccountStatus,
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    #[schema(value_type = String)]
    pub identity_type: IdentityType,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub photo_path: String,
    pub verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>)]
    pub latest_request_status: Option<ReviewStatus>,
}

fn request_view(tables: &Tables, rec: &ProfileRequestRecord) -> ProfileRequestView {
    let identity = tables.identity(rec.identity_id);
    ProfileRequestView {
        id: rec.id,
        user_id: rec.user_id,
        student_name: identity.map(|i| i.full_name.clone()).unwrap_or_default(),
        email: tables.user(rec.user_id).map(|u| u.email.clone()),
        status: rec.status,
        fields: rec.proposal.fields(),
        proposed: ProposedChanges {
            full_name: rec.proposal.full_name.clone(),
            date_of_birth: rec.proposal.date_of_birth,
            identity_type: rec.proposal.identity_type,
            identity_number_changed: rec.proposal.identity_fingerprint.is_some(),
            photo_path: rec.proposal.photo_path.clone(),
        },
        proof_document: rec.proof_document.clone(),
        reviewer_comment: rec.reviewer_comment.clone(),
        created_at: rec.created_at,
        reviewed_at: rec.reviewed_at,
    }
}

fn student_records(
    tables: &Tables,
    user_id: UserId,
) -> Result<(StudentIdentityRecord, StudentProfileRecord), RegistryError> {
    let identity = tables
        .identity_by_user(user_id)
        .cloned()
        .ok_or_else(|| RegistryError::not_found("student profile not found"))?;
    let profile = tables
        .profile_by_identity(identity.id)
        .cloned()
        .ok_or_else(|| RegistryError::not_found("student profile not found"))?;
    Ok((identity, profile))
}

fn fingerprint_taken(tables: &Tables, fp: &IdentityFingerprint, own: &StudentIdentityRecord) -> bool {
    tables
        .identity_by_fingerprint(fp)
        .is_some_and(|other| other.id != own.id)
}

fn identity_taken() -> RegistryError {
    RegistryError::conflict("this identity number is already registered to another account")
}

/// Keep only the submitted values that differ from the current record.
fn diff(
    submission: &ProfileRequestSubmission,
    identity: &StudentIdentityRecord,
    profile: &StudentProfileRecord,
) -> Result<ProfileProposal, ValidationError> {
    let mut proposal = ProfileProposal::default();

    if let Some(name) = optional(submission.full_name.as_deref()) {
        let name = bounded("fullName", name, MAX_NAME_LEN)?;
        if name != identity.full_name {
            proposal.full_name = Some(name);
        }
    }
    if let Some(raw) = optional(submission.date_of_birth.as_deref()) {
        let dob = parse_calendar_date("dateOfBirth", &raw)?;
        if dob != identity.date_of_birth {
            proposal.date_of_birth = Some(dob);
        }
    }
    let new_type = match optional(submission.identity_type.as_deref()) {
        Some(raw) => Some(raw.parse::<IdentityType>()?),
        None => None,
    };
    let new_number = IdentityFingerprint::of_optional(submission.identity_number.as_deref());
    if let Some(t) = new_type.filter(|t| *t != identity.identity_type) {
        match &new_number {
            None => {
                return Err(ValidationError::MissingField {
                    field: "identityNumber",
                })
            }
            Some(fp) if *fp == identity.identity_fingerprint => {
                return Err(ValidationError::Unchanged {
                    field: "identityNumber",
                })
            }
            Some(_) => {}
        }
        proposal.identity_type = Some(t);
    }
    if let Some(fp) = new_number.filter(|fp| *fp != identity.identity_fingerprint) {
        proposal.identity_fingerprint = Some(fp);
    }
    if let Some(photo) = optional(submission.photo_path.as_deref()) {
        if photo != profile.photo_path {
            proposal.photo_path = Some(photo);
        }
    }
    Ok(proposal)
}

/// `None` leaves the field alone; `Some(None)` clears it.
fn contact_field(
    field: &'static str,
    raw: Option<String>,
    max: usize,
) -> Result<Option<Option<String>>, ValidationError> {
    raw.map(|raw| optional(Some(raw.as_str())).map(|v| bounded(field, v, max)).transpose())
        .transpose()
}

/// Write an approved proposal onto the identity and profile.
fn apply_proposal(
    tx: &mut Transaction,
    proposal: &ProfileProposal,
    identity_id: IdentityId,
    admin: UserId,
    at: DateTime<Utc>,
) -> Result<(), RegistryError> {
    let identity = tx
        .tables()
        .identity(identity_id)
        .cloned()
        .ok_or_else(|| RegistryError::Persistence(format!("identity {identity_id} missing")))?;
    let mut updated = identity.clone();

    if let Some(name) = &proposal.full_name {
        updated.full_name = name.clone();
    }
    if let Some(dob) = proposal.date_of_birth {
        updated.date_of_birth = dob;
    }
    if let Some(t) = proposal.identity_type {
        updated.identity_type = t;
    }
    if let Some(fp) = &proposal.identity_fingerprint {
        if fingerprint_taken(tx.tables(), fp, &identity) {
            return Err(identity_taken());
        }
        updated.identity_fingerprint = fp.clone();
    }
    if touches_identity(&proposal.fields()) {
        updated.verified = Some(VerificationStamp { by: admin, at });
    }
    if updated != identity {
        updated.updated_at = at;
        tx.put_identity(updated)?;
    }

    if let Some(photo) = &proposal.photo_path {
        let profile = tx
            .tables()
            .profile_by_identity(identity_id)
            .cloned()
            .ok_or_else(|| RegistryError::Persistence(format!("profile for {identity_id} missing")))?;
        tx.put_profile(StudentProfileRecord {
            photo_path: photo.clone(),
            updated_at: at,
            ..profile
        })?;
    }
    Ok(())
}

impl Registry {
    /// Apply a contact change directly.
    pub async fn update_contact(
        &self,
        user_id: UserId,
        update: ContactUpdate,
    ) -> Result<StudentProfileView, RegistryError> {
        if update.phone.is_none() && update.address.is_none() {
            return Err(RegistryError::validation("phone or address is required"));
        }
        let phone = contact_field("phone", update.phone, MAX_PHONE_LEN)?;
        let address = contact_field("address", update.address, MAX_ADDRESS_LEN)?;

        let at = self.now();
        self.ledger
            .transact("update_contact", move |tx| {
                let (identity, _) = student_records(tx.tables(), user_id)?;
                let mut updated = identity.clone();
                if let Some(phone) = phone {
                    updated.phone = phone;
                }
                if let Some(address) = address {
                    updated.address = address;
                }
                if updated != identity {
                    updated.updated_at = at;
                    tx.put_identity(updated)?;
                }
                Ok(())
            })
            .await?;
        tracing::info!(%user_id, "contact details updated");
        self.my_profile(user_id)
    }

    /// Submit an identity change for review.
    pub async fn submit_profile_request(
        &self,
        user_id: UserId,
        submission: ProfileRequestSubmission,
    ) -> Result<ProfileRequestView, RegistryError> {
        let at = self.now();
        let (view, recipient) = self
            .ledger
            .transact("submit_profile_request", move |tx| {
                let tables = tx.tables();
                let (identity, profile) = student_records(tables, user_id)?;
                if tables.pending_request_for(user_id).is_some() {
                    return Err(RegistryError::conflict("a profile request is already pending"));
                }

                let proposal = diff(&submission, &identity, &profile)?;
                if proposal.is_empty() {
                    return Err(RegistryError::validation("no changes detected"));
                }
                if let Some(fp) = &proposal.identity_fingerprint {
                    if fingerprint_taken(tables, fp, &identity) {
                        return Err(identity_taken());
                    }
                }
                let proof_document = optional(submission.proof_document.as_deref());
                if touches_identity(&proposal.fields()) && proof_document.is_none() {
                    return Err(RegistryError::validation(
                        "proof document is required for identity changes",
                    ));
                }
                let recipient = tables.user(user_id).map(|u| u.email.clone());

                let record = ProfileRequestRecord {
                    id: ProfileRequestId::new(),
                    user_id,
                    identity_id: identity.id,
                    status: ReviewStatus::Pending,
                    proposal,
                    proof_document,
                    reviewer: None,
                    reviewer_comment: None,
                    created_at: at,
                    reviewed_at: None,
                };
                tx.put_profile_request(record.clone())?;
                Ok((request_view(tx.tables(), &record), recipient))
            })
            .await?;

        tracing::info!(%user_id, request_id = %view.id, fields = ?view.fields, "profile request submitted");
        if let Some(recipient) = recipient {
            self.notify(Notification::new(
                recipient,
                NotificationKind::ProfileRequestReceived {
                    student_name: view.student_name.clone(),
                },
            ));
        }
        Ok(view)
    }

    /// Requests with the given status (default pending), newest first.
    pub fn list_profile_requests(&self, status: Option<ReviewStatus>) -> Vec<ProfileRequestView> {
        let status = status.unwrap_or(ReviewStatus::Pending);
        let mut views: Vec<ProfileRequestView> = self.ledger.read(|t| {
            t.profile_requests()
                .filter(|r| r.status == status)
                .map(|r| request_view(t, r))
                .collect()
        });
        views.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        views
    }

    /// Decide a pending request.
    pub async fn review_profile_request(
        &self,
        request_id: ProfileRequestId,
        admin: UserId,
        decision: ReviewDecision,
        comment: Option<String>,
    ) -> Result<ProfileRequestView, RegistryError> {
        let comment = optional(comment.as_deref())
            .map(|c| bounded("comment", c, MAX_COMMENT_LEN))
            .transpose()?;
        let at = self.now();
        let (view, recipient) = self
            .ledger
            .transact("review_profile_request", move |tx| {
                let request = tx
                    .tables()
                    .profile_request(request_id)
                    .cloned()
                    .ok_or_else(|| RegistryError::not_found("profile request not found"))?;
                let status = request.status.decide(decision)?;
                if status == ReviewStatus::Approved {
                    apply_proposal(tx, &request.proposal, request.identity_id, admin, at)?;
                }
                let decided = ProfileRequestRecord {
                    status,
                    reviewer: Some(admin),
                    reviewer_comment: comment,
                    reviewed_at: Some(at),
                    ..request
                };
                tx.put_profile_request(decided.clone())?;
                let recipient = tx.tables().user(decided.user_id).map(|u| u.email.clone());
                Ok((request_view(tx.tables(), &decided), recipient))
            })
            .await?;

        tracing::info!(%request_id, %admin, status = %view.status, "profile request reviewed");
        if let Some(recipient) = recipient {
            self.notify(Notification::new(
                recipient,
                NotificationKind::ProfileRequestDecided {
                    student_name: view.student_name.clone(),
                    status: view.status,
                    comment: view.reviewer_comment.clone(),
                },
            ));
        }
        Ok(view)
    }

    /// The caller's own record.
    pub fn my_profile(&self, user_id: UserId) -> Result<StudentProfileView, RegistryError> {
        self.ledger.read(|t| {
            let (identity, profile) = student_records(t, user_id)?;
            let user = t
                .user(user_id)
                .ok_or_else(|| RegistryError::not_found("student profile not found"))?;
            Ok(StudentProfileView {
                student_id: profile.id,
                email: user.email.clone(),
                status: user.status,
                full_name: identity.full_name,
                date_of_birth: identity.date_of_birth,
                identity_type: identity.identity_type,
                phone: identity.phone,
                address: identity.address,
                photo_path: profile.photo_path,
                verified: identity.verified.is_some(),
                verified_at: identity.verified.map(|v| v.at),
                latest_request_status: t.latest_request_for(user_id).map(|r| r.status),
            })
        })
    }
}
