//! # Identifier Newtypes
//!
//! Record identifiers are UUID newtypes and are always valid by construction.
//! [`Email`] is the one string identifier; it normalizes on construction so
//! that two spellings of the same address can never become two accounts.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Access the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_identifier!(
    /// A registered account of any role.
    UserId
);
uuid_identifier!(
    /// A student's identity record (name, date of birth, identity fingerprint).
    IdentityId
);
uuid_identifier!(
    /// The global student id: the join key for enrollment and issuance.
    StudentId
);
uuid_identifier!(
    /// An issuing institution.
    InstitutionId
);
uuid_identifier!(
    /// One institution-scoped enrollment row.
    EnrollmentId
);
uuid_identifier!(
    /// An issued certificate.
    CertificateId
);
uuid_identifier!(
    /// A student's proposal to change identity attributes.
    ProfileRequestId
);

/// A normalized email address: trimmed and lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    /// Normalize and validate an address.
    ///
    /// Only the shape `local@domain` is checked; deliverability is not.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(ValidationError::MissingField { field: "email" });
        }
        match normalized.split_once('@') {
            Some((local, domain))
                if !local.is_empty()
                    && !domain.is_empty()
                    && !domain.contains('@')
                    && !normalized.contains(char::is_whitespace) =>
            {
                Ok(Self(normalized))
            }
            _ => Err(ValidationError::InvalidEmail(normalized)),
        }
    }

    /// The normalized address.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Email {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}

impl std::fmt::Display for Email {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types_with_uuid_display() {
        let uuid = Uuid::new_v4();
        let student = StudentId::from_uuid(uuid);
        assert_eq!(student.to_string(), uuid.to_string());
        assert_eq!(*student.as_uuid(), uuid);
        assert_ne!(UserId::new(), UserId::new());
    }

    #[test]
    fn id_serializes_as_bare_uuid() {
        let uuid = Uuid::new_v4();
        let json = serde_json::to_string(&CertificateId::from(uuid)).unwrap();
        assert_eq!(json, format!("\"{uuid}\""));
    }

    #[test]
    fn email_is_trimmed_and_lowercased() {
        let email = Email::parse("  Registrar@Dhaka.EDU ").unwrap();
        assert_eq!(email.as_str(), "registrar@dhaka.edu");
    }

    #[test]
    fn email_rejects_bad_shapes() {
        assert_eq!(
            Email::parse("   "),
            Err(ValidationError::MissingField { field: "email" })
        );
        assert!(Email::parse("no-at-sign").is_err());
        assert!(Email::parse("@domain.org").is_err());
        assert!(Email::parse("a@b@c").is_err());
        assert!(Email::parse("a b@c.org").is_err());
    }

    #[test]
    fn email_deserialization_normalizes() {
        let email: Email = serde_json::from_str("\"Student@Example.com\"").unwrap();
        assert_eq!(email.as_str(), "student@example.com");
        assert!(serde_json::from_str::<Email>("\"nope\"").is_err());
    }
}
