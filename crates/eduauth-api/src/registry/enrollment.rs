//! # Enrollment Ledger
//!
//! An institution's roster, mapping its local student id to a global
//! student. Enrollment is the gate for issuance: an institution can only
//! issue to a local id it has enrolled.
//!
//! Students are found by identity fingerprint. An unknown fingerprint and a
//! student who has not been approved yet produce the same `NotFound`, so the
//! roster cannot be used to probe the admin queue.

use chrono::{DateTime, Utc};
use eduauth_core::{EnrollmentId, IdentityFingerprint, InstitutionId, Role, StudentId, ValidationError};
use eduauth_state::AccountStatus;
use serde::Serialize;
use utoipa::ToSchema;

use super::error::RegistryError;
use super::input::{bounded, optional, required};
use super::ledger::Tables;
use super::records::{EnrollmentRecord, StudentProfileRecord};
use super::Registry;

const MAX_FIELD_LEN: usize = 100;

/// A checked enrollment request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEnrollment {
    pub local_student_id: String,
    pub identity: IdentityFingerprint,
    pub department: String,
    pub session: String,
}

impl NewEnrollment {
    /// Check the raw fields. The identity number is fingerprinted here and
    /// dropped.
    pub fn new(
        local_student_id: Option<&str>,
        identity_number: Option<&str>,
        department: Option<&str>,
        session: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let local_student_id = bounded(
            "localStudentId",
            required("localStudentId", local_student_id)?,
            MAX_FIELD_LEN,
        )?;
        let identity = IdentityFingerprint::of_optional(identity_number).ok_or(
            ValidationError::MissingField {
                field: "identityNumber",
            },
        )?;
        let department = bounded("department", required("department", department)?, MAX_FIELD_LEN)?;
        let session = bounded("session", required("session", session)?, MAX_FIELD_LEN)?;
        Ok(Self {
            local_student_id,
            identity,
            department,
            session,
        })
    }
}

/// Optional equality filters for the roster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrollmentFilter {
    pub session: Option<String>,
    pub department: Option<String>,
}

impl EnrollmentFilter {
    pub fn new(session: Option<&str>, department: Option<&str>) -> Self {
        Self {
            session: optional(session),
            department: optional(department),
        }
    }

    fn matches(&self, e: &EnrollmentRecord) -> bool {
        self.session.as_deref().map_or(true, |s| e.session == s)
            && self.department.as_deref().map_or(true, |d| e.department == d)
    }
}

/// A roster row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnrolledStudent {
    #[schema(value_type = String)]
    pub enrollment_id: EnrollmentId,
    #[schema(value_type = String)]
    pub student_id: StudentId,
    pub local_student_id: String,
    pub full_name: String,
    pub photo_path: String,
    pub department: String,
    pub session: String,
    pub enrolled_at: DateTime<Utc>,
}

fn roster_row(tables: &Tables, e: &EnrollmentRecord) -> Option<EnrolledStudent> {
    let profile = tables.profile(e.student_id)?;
    let identity = tables.identity(profile.identity_id)?;
    Some(EnrolledStudent {
        enrollment_id: e.id,
        student_id: e.student_id,
        local_student_id: e.local_student_id.clone(),
        full_name: identity.full_name.clone(),
        photo_path: profile.photo_path.clone(),
        department: e.department.clone(),
        session: e.session.clone(),
        enrolled_at: e.enrolled_at,
    })
}

/// The profile of an active student holding `fp`.
fn active_student<'t>(tables: &'t Tables, fp: &IdentityFingerprint) -> Option<&'t StudentProfileRecord> {
    let identity = tables.identity_by_fingerprint(fp)?;
    let user = tables.user(identity.user_id)?;
    if user.role != Role::Student || user.status != AccountStatus::Active {
        return None;
    }
    tables.profile_by_identity(identity.id)
}

impl Registry {
    /// Add a student to an institution's roster.
    pub async fn enroll(
        &self,
        institution_id: InstitutionId,
        request: NewEnrollment,
    ) -> Result<EnrolledStudent, RegistryError> {
        let at = self.now();
        let row = self
            .ledger
            .transact("enroll", move |tx| {
                let tables = tx.tables();
                if tables.institution(institution_id).is_none() {
                    return Err(RegistryError::not_found("institution not found"));
                }
                let student_id = active_student(tables, &request.identity)
                    .map(|p| p.id)
                    .ok_or_else(|| RegistryError::not_found("student not found or not yet approved"))?;
                if tables.enrollment_of(institution_id, student_id).is_some() {
                    return Err(RegistryError::conflict("student is already enrolled"));
                }
                if tables
                    .enrollment_by_local_id(institution_id, &request.local_student_id)
                    .is_some()
                {
                    return Err(RegistryError::conflict("local student id is already in use"));
                }

                let record = EnrollmentRecord {
                    id: EnrollmentId::new(),
                    institution_id,
                    student_id,
                    local_student_id: request.local_student_id,
                    department: request.department,
                    session: request.session,
                    enrolled_at: at,
                };
                tx.insert_enrollment(record.clone())?;
                roster_row(tx.tables(), &record)
                    .ok_or_else(|| RegistryError::Persistence("enrolled student has no identity".into()))
            })
            .await?;

        tracing::info!(
            %institution_id,
            student_id = %row.student_id,
            local_student_id = %row.local_student_id,
            "student enrolled"
        );
        Ok(row)
    }

    /// The roster, filtered and ordered by local student id.
    pub fn list_enrolled(
        &self,
        institution_id: InstitutionId,
        filter: &EnrollmentFilter,
    ) -> Vec<EnrolledStudent> {
        let mut rows: Vec<EnrolledStudent> = self.ledger.read(|t| {
            t.enrollments_of(institution_id)
                .filter(|e| filter.matches(e))
                .filter_map(|e| roster_row(t, e))
                .collect()
        });
        rows.sort_by(|a, b| a.local_student_id.cmp(&b.local_student_id));
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::testing::*;

    fn request(local: &str, nid: &str) -> NewEnrollment {
        NewEnrollment::new(Some(local), Some(nid), Some("CSE"), Some("2021-22")).unwrap()
    }

    #[tokio::test]
    async fn enrolls_active_student_by_identity_number() {
        let f = fixture().await;
        f.active_student("s@example.org", NID).await;
        let inst = f.active_institution("i@example.org").await;
        let institution_id = inst.institution_id.unwrap();

        let row = f
            .registry
            .enroll(institution_id, request("CSE-01", NID))
            .await
            .unwrap();
        assert_eq!(row.local_student_id, "CSE-01");
        assert_eq!(row.full_name, "Nusrat Jahan");
    }

    #[tokio::test]
    async fn pending_and_unknown_students_look_the_same() {
        let f = fixture().await;
        f.registry
            .register(student_registration("s@example.org", NID))
            .await
            .unwrap();
        let inst = f.active_institution("i@example.org").await;
        let institution_id = inst.institution_id.unwrap();

        for nid in [NID, "9999999999"] {
            let err = f
                .registry
                .enroll(institution_id, request("CSE-01", nid))
                .await
                .unwrap_err();
            assert_eq!(
                err,
                RegistryError::NotFound("student not found or not yet approved".into())
            );
        }
    }

    #[tokio::test]
    async fn double_enrollment_conflicts_and_keeps_one_row() {
        let f = fixture().await;
        f.active_student("s@example.org", NID).await;
        let inst = f.active_institution("i@example.org").await;
        let institution_id = inst.institution_id.unwrap();

        f.registry
            .enroll(institution_id, request("CSE-01", NID))
            .await
            .unwrap();
        let err = f
            .registry
            .enroll(institution_id, request("CSE-02", NID))
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::Conflict("student is already enrolled".into()));
        assert_eq!(
            f.registry
                .list_enrolled(institution_id, &EnrollmentFilter::default())
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn local_id_reuse_conflicts() {
        let f = fixture().await;
        f.active_student("a@example.org", NID).await;
        f.active_student("b@example.org", "5555555555").await;
        let inst = f.active_institution("i@example.org").await;
        let institution_id = inst.institution_id.unwrap();

        f.registry
            .enroll(institution_id, request("CSE-01", NID))
            .await
            .unwrap();
        let err = f
            .registry
            .enroll(institution_id, request("CSE-01", "5555555555"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::Conflict("local student id is already in use".into())
        );
    }

    #[tokio::test]
    async fn same_student_may_join_two_institutions() {
        let f = fixture().await;
        f.active_student("s@example.org", NID).await;
        let a = f.active_institution("a@example.org").await.institution_id.unwrap();
        let b = f.active_institution("b@example.org").await.institution_id.unwrap();
        f.registry.enroll(a, request("X-1", NID)).await.unwrap();
        f.registry.enroll(b, request("X-1", NID)).await.unwrap();
    }

    #[tokio::test]
    async fn roster_filters_combine() {
        let f = fixture().await;
        f.active_student("a@example.org", "1111111111").await;
        f.active_student("b@example.org", "2222222222").await;
        f.active_student("c@example.org", "3333333333").await;
        let inst = f.active_institution("i@example.org").await.institution_id.unwrap();
        let enroll = |local: &'static str, nid: &'static str, dept: &'static str, session: &'static str| {
            NewEnrollment::new(Some(local), Some(nid), Some(dept), Some(session)).unwrap()
        };
        f.registry.enroll(inst, enroll("03", "1111111111", "CSE", "2021")).await.unwrap();
        f.registry.enroll(inst, enroll("01", "2222222222", "CSE", "2022")).await.unwrap();
        f.registry.enroll(inst, enroll("02", "3333333333", "EEE", "2022")).await.unwrap();

        let all = f.registry.list_enrolled(inst, &EnrollmentFilter::default());
        let ids: Vec<_> = all.iter().map(|r| r.local_student_id.as_str()).collect();
        assert_eq!(ids, ["01", "02", "03"]);

        let filter = EnrollmentFilter::new(Some("2022"), Some("CSE"));
        let rows = f.registry.list_enrolled(inst, &filter);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].local_student_id, "01");

        let blank = EnrollmentFilter::new(Some(" "), None);
        assert_eq!(f.registry.list_enrolled(inst, &blank).len(), 3);
    }

    #[test]
    fn request_requires_identity_number() {
        assert_eq!(
            NewEnrollment::new(Some("X"), Some(""), Some("CSE"), Some("2021")),
            Err(ValidationError::MissingField {
                field: "identityNumber"
            })
        );
    }
}
