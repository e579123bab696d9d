//! # Closed Domain Sets
//!
//! Every enum here has a fixed snake_case wire form, an [`ALL`](Role::ALL)
//! listing, and a case-insensitive `FromStr` that rejects anything outside
//! the set with [`ValidationError::UnknownVariant`].

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

macro_rules! closed_set {
    (
        $(#[$meta:meta])*
        $name:ident ($kind:literal) {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            /// Every member of the set, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The wire representation.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let lowered = s.trim().to_ascii_lowercase();
                match lowered.as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(ValidationError::UnknownVariant {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

closed_set! {
    /// Account role. Fixed at registration and never changed afterwards.
    Role("role") {
        /// A credential holder.
        Student => "student",
        /// A credential issuer.
        Institution => "institution",
        /// The registry authority.
        Admin => "admin",
    }
}

impl Role {
    /// Whether this role may be chosen at self-registration.
    pub fn is_self_registrable(&self) -> bool {
        !matches!(self, Self::Admin)
    }
}

closed_set! {
    /// Which document the identity number comes from.
    IdentityType("identity type") {
        /// National identity card number.
        Nid => "nid",
        /// Birth registration certificate number.
        BirthCertificate => "birth_certificate",
    }
}

impl Default for IdentityType {
    fn default() -> Self {
        Self::Nid
    }
}

closed_set! {
    /// Kind of issuing institution.
    InstitutionType("institution type") {
        /// Degree-awarding university.
        University => "university",
        /// Affiliated or independent college.
        College => "college",
        /// Polytechnic institute.
        Polytechnic => "polytechnic",
        /// Vocational or technical school.
        VocationalSchool => "vocational_school",
        /// Short-course training center.
        TrainingCenter => "training_center",
        /// Examination board.
        Board => "board",
    }
}

impl Default for InstitutionType {
    fn default() -> Self {
        Self::University
    }
}

closed_set! {
    /// Kind of credential.
    CertificateType("certificate type") {
        /// Bachelor's, master's or doctoral degree.
        Degree => "degree",
        /// Diploma.
        Diploma => "diploma",
        /// Academic transcript.
        Transcript => "transcript",
        /// Any other certificate of completion.
        Certificate => "certificate",
    }
}

closed_set! {
    /// Certificate status. Only `active` is produced today.
    CertificateStatus("certificate status") {
        /// Valid and publicly verifiable.
        Active => "active",
        /// Withdrawn by the issuer.
        Revoked => "revoked",
    }
}
