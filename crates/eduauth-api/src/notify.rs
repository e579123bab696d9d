//! # Outbound Notifications
//!
//! Fire-and-forget messages to account holders. The registry sends a
//! notification only after the transaction that caused it has committed, and
//! a notifier failure is logged and dropped. It never reaches the caller.
//!
//! Three implementations:
//!
//! - [`LogNotifier`] renders the message into the log (the default).
//! - [`WebhookNotifier`] POSTs the rendered message to a relay that does the
//!   actual mail delivery.
//! - [`RecordingNotifier`] keeps every message in memory for tests.

use std::fmt;

use eduauth_core::{CertificateFingerprint, Email, Role};
use eduauth_state::ReviewStatus;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

/// What happened, with the data the message template needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationKind {
    AccountApproved {
        name: String,
        role: Role,
    },
    CertificateIssued {
        student_name: String,
        credential_name: String,
        institution_name: String,
        fingerprint: CertificateFingerprint,
        verify_url: String,
    },
    IssuancePermissionChanged {
        institution_name: String,
        can_issue: bool,
    },
    ProfileRequestReceived {
        student_name: String,
    },
    ProfileRequestDecided {
        student_name: String,
        status: ReviewStatus,
        comment: Option<String>,
    },
}

/// A message addressed to one account holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub recipient: Email,
    #[serde(flatten)]
    pub kind: NotificationKind,
}

impl Notification {
    pub fn new(recipient: Email, kind: NotificationKind) -> Self {
        Self { recipient, kind }
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            NotificationKind::AccountApproved { .. } => "account_approved",
            NotificationKind::CertificateIssued { .. } => "certificate_issued",
            NotificationKind::IssuancePermissionChanged { .. } => "issuance_permission_changed",
            NotificationKind::ProfileRequestReceived { .. } => "profile_request_received",
            NotificationKind::ProfileRequestDecided { .. } => "profile_request_decided",
        }
    }

    pub fn subject(&self) -> String {
        match &self.kind {
            NotificationKind::AccountApproved { .. } => "Your EduAuth account is approved".into(),
            NotificationKind::CertificateIssued {
                credential_name, ..
            } => format!("New certificate issued: {credential_name}"),
            NotificationKind::IssuancePermissionChanged { can_issue: true, .. } => {
                "Certificate issuance enabled".into()
            }
            NotificationKind::IssuancePermissionChanged { can_issue: false, .. } => {
                "Certificate issuance disabled".into()
            }
            NotificationKind::ProfileRequestReceived { .. } => {
                "Profile update request received".into()
            }
            NotificationKind::ProfileRequestDecided { status, .. } => {
                format!("Profile update request {status}")
            }
        }
    }

    pub fn body(&self) -> String {
        match &self.kind {
            NotificationKind::AccountApproved { name, role } => format!(
                "Hello {name},\n\nYour {role} account has been approved. You can now sign in."
            ),
            NotificationKind::CertificateIssued {
                student_name,
                credential_name,
                institution_name,
                fingerprint,
                verify_url,
            } => format!(
                "Hello {student_name},\n\n{institution_name} has issued your certificate \
                 \"{credential_name}\".\nCertificate hash: {fingerprint}\nVerify: {verify_url}"
            ),
            NotificationKind::IssuancePermissionChanged {
                institution_name,
                can_issue,
            } => {
                let state = if *can_issue { "enabled" } else { "disabled" };
                format!(
                    "Hello {institution_name},\n\nCertificate issuance has been {state} for \
                     your institution by the registry authority."
                )
            }
            NotificationKind::ProfileRequestReceived { student_name } => format!(
                "Hello {student_name},\n\nWe received your profile update request. \
                 An administrator will review it shortly."
            ),
            NotificationKind::ProfileRequestDecided {
                student_name,
                status,
                comment,
            } => {
                let mut text = format!(
                    "Hello {student_name},\n\nYour profile update request has been {status}."
                );
                if let Some(comment) = comment {
                    text.push_str(&format!("\nReviewer comment: {comment}"));
                }
                text
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("no async runtime available to deliver notification")]
    NoRuntime,
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Side channel for notifications. Implementations must not block.
pub trait Notifier: Send + Sync + fmt::Debug {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes each notification to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            to = %notification.recipient,
            kind = notification.kind_name(),
            subject = %notification.subject(),
            "notification"
        );
        Ok(())
    }
}

/// POSTs each notification as JSON to a relay endpoint.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    #[serde(flatten)]
    notification: &'a Notification,
    subject: String,
    text: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

impl Notifier for WebhookNotifier {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| NotifyError::NoRuntime)?;
        let payload = serde_json::to_value(WebhookPayload {
            notification,
            subject: notification.subject(),
            text: notification.body(),
        })
        .map_err(|e| NotifyError::Delivery(e.to_string()))?;
        let client = self.client.clone();
        let url = self.url.clone();
        let kind = notification.kind_name();
        handle.spawn(async move {
            let result = client
                .post(&url)
                .json(&payload)
                .send()
                .await
                .and_then(|r| r.error_for_status());
            if let Err(e) = result {
                tracing::warn!(kind, error = %e, "notification relay failed");
            }
        });
        Ok(())
    }
}

/// Keeps notifications in memory. Optionally reports failure after recording.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records every notification, then returns an error for it.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }

    pub fn count_of(&self, kind: &str) -> usize {
        self.sent.lock().iter().filter(|n| n.kind_name() == kind).count()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().push(notification.clone());
        if self.fail {
            Err(NotifyError::Delivery("recording notifier set to fail".into()))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to() -> Email {
        Email::parse("student@example.org").unwrap()
    }

    #[test]
    fn certificate_message_carries_verify_link() {
        let fp = CertificateFingerprint::from_hex(&"a".repeat(64)).unwrap();
        let n = Notification::new(
            to(),
            NotificationKind::CertificateIssued {
                student_name: "Nusrat Jahan".into(),
                credential_name: "BSc CSE".into(),
                institution_name: "Dhaka University".into(),
                fingerprint: fp.clone(),
                verify_url: format!("http://localhost:3000/verify/{fp}"),
            },
        );
        assert_eq!(n.subject(), "New certificate issued: BSc CSE");
        assert!(n.body().contains(&format!("/verify/{fp}")));
        assert_eq!(n.kind_name(), "certificate_issued");
    }

    #[test]
    fn permission_subject_follows_flag() {
        let on = Notification::new(
            to(),
            NotificationKind::IssuancePermissionChanged {
                institution_name: "X".into(),
                can_issue: true,
            },
        );
        let off = Notification::new(
            to(),
            NotificationKind::IssuancePermissionChanged {
                institution_name: "X".into(),
                can_issue: false,
            },
        );
        assert_eq!(on.subject(), "Certificate issuance enabled");
        assert!(off.body().contains("disabled"));
    }

    #[test]
    fn decision_includes_comment_only_when_present() {
        let with = Notification::new(
            to(),
            NotificationKind::ProfileRequestDecided {
                student_name: "N".into(),
                status: ReviewStatus::Rejected,
                comment: Some("blurry scan".into()),
            },
        );
        assert_eq!(with.subject(), "Profile update request rejected");
        assert!(with.body().contains("Reviewer comment: blurry scan"));

        let without = Notification::new(
            to(),
            NotificationKind::ProfileRequestDecided {
                student_name: "N".into(),
                status: ReviewStatus::Approved,
                comment: None,
            },
        );
        assert!(!without.body().contains("Reviewer comment"));
    }

    #[test]
    fn serialized_form_is_flat_and_tagged() {
        let n = Notification::new(
            to(),
            NotificationKind::ProfileRequestReceived {
                student_name: "N".into(),
            },
        );
        let v = serde_json::to_value(&n).unwrap();
        assert_eq!(v["kind"], "profile_request_received");
        assert_eq!(v["recipient"], "student@example.org");
        assert_eq!(v["student_name"], "N");
    }

    #[test]
    fn recording_notifier_records_even_when_failing() {
        let notifier = RecordingNotifier::failing();
        let n = Notification::new(
            to(),
            NotificationKind::ProfileRequestReceived {
                student_name: "N".into(),
            },
        );
        assert!(notifier.send(&n).is_err());
        assert_eq!(notifier.count_of("profile_request_received"), 1);
    }

    #[test]
    fn webhook_without_runtime_reports_error() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/hook");
        let n = Notification::new(
            to(),
            NotificationKind::ProfileRequestReceived {
                student_name: "N".into(),
            },
        );
        assert!(matches!(notifier.send(&n), Err(NotifyError::NoRuntime)));
    }
}
