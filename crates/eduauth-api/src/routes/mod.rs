//! # API Route Modules
//!
//! Every path is under `/api/v1`:
//!
//! - `auth`: registration, login, logout, current principal.
//! - `uploads`: blob upload for photos and proof documents.
//! - `admin`: approval queue, issuance permission, profile-request review.
//! - `institution`: enrollment roster.
//! - `certificates`: issuance and the student's own certificates.
//! - `students`: the student's profile, contact details and change requests.
//! - `verify`: public certificate verification.

pub mod admin;
pub mod auth;
pub mod certificates;
pub mod institution;
pub mod students;
pub mod uploads;
pub mod verify;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Outcome of an administrative action.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<uuid::Uuid>,
}

impl ActionResponse {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
            user_id: None,
        }
    }

    pub fn for_user(message: &str, user_id: uuid::Uuid) -> Self {
        Self {
            message: message.to_string(),
            user_id: Some(user_id),
        }
    }
}
