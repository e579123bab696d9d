//! # Certificate Metadata
//!
//! Issuers send metadata in one of two explicitly tagged shapes:
//!
//! ```json
//! {"schema": "academic", "major": "CSE", "cgpa": "3.80", "creditHours": 140}
//! {"schema": "legacy_details", "details": {"fieldOfStudy": "CSE", "gradeGpa": 3.8}}
//! ```
//!
//! [`normalize_metadata`] maps either shape, together with the explicit
//! `fieldOfStudy` / `grade` fields of the issuance request, onto one
//! [`CertificateMetadata`]. The function is total and pure: it never fails,
//! and the same input always yields the same output. Explicit request fields
//! win over anything embedded in the payload. Blank strings count as absent.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A scalar as sent by a client. Numbers are kept in their textual form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// A JSON string.
    Text(String),
    /// A JSON integer.
    Integer(i64),
    /// A JSON number with a fractional part.
    Decimal(f64),
    /// A JSON boolean.
    Flag(bool),
}

impl Scalar {
    fn render(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Decimal(f) => f.to_string(),
            Self::Flag(b) => b.to_string(),
        }
    }
}

/// The current metadata shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AcademicMetadata {
    /// Major or field of study.
    #[serde(default)]
    pub major: Option<Scalar>,
    /// Grade or CGPA.
    #[serde(default, alias = "cgpa")]
    pub grade: Option<Scalar>,
    /// Completed credit hours.
    #[serde(default)]
    pub credit_hours: Option<Scalar>,
    /// Convocation date, free text.
    #[serde(default)]
    pub convocation_date: Option<Scalar>,
    /// Any further issuer-specific key/value pairs.
    #[serde(default)]
    pub extra: BTreeMap<String, Scalar>,
}

/// Metadata as submitted with an issuance request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "schema", rename_all = "snake_case")]
pub enum MetadataPayload {
    /// Structured academic metadata.
    Academic(AcademicMetadata),
    /// A free-form bag from older issuing clients.
    LegacyDetails {
        /// Arbitrary key/value pairs.
        details: serde_json::Map<String, Value>,
    },
}

/// Normalized metadata, stored with the certificate and hashed into its
/// fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateMetadata {
    /// Major or field of study.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub major: Option<String>,
    /// Grade or CGPA.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    /// Completed credit hours.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_hours: Option<String>,
    /// Convocation date, free text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convocation_date: Option<String>,
    /// Remaining key/value pairs, sorted by key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl CertificateMetadata {
    /// Whether no field carries a value.
    pub fn is_empty(&self) -> bool {
        self.major.is_none()
            && self.grade.is_none()
            && self.credit_hours.is_none()
            && self.convocation_date.is_none()
            && self.extra.is_empty()
    }
}

#[derive(Clone, Copy)]
enum Slot {
    Major,
    Grade,
    CreditHours,
    ConvocationDate,
}

fn legacy_slot(key: &str) -> Option<Slot> {
    match key {
        "major" | "fieldOfStudy" | "field_of_study" => Some(Slot::Major),
        "grade" | "cgpa" | "gradeGpa" | "grade_gpa" => Some(Slot::Grade),
        "creditHours" | "credit_hours" => Some(Slot::CreditHours),
        "convocationDate" | "convocation_date" => Some(Slot::ConvocationDate),
        _ => None,
    }
}

fn non_blank(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => non_blank(s),
        other => Some(other.to_string()),
    }
}

fn render_scalar(value: Option<&Scalar>) -> Option<String> {
    value.and_then(|s| non_blank(&s.render()))
}

impl CertificateMetadata {
    fn slot_mut(&mut self, slot: Slot) -> &mut Option<String> {
        match slot {
            Slot::Major => &mut self.major,
            Slot::Grade => &mut self.grade,
            Slot::CreditHours => &mut self.credit_hours,
            Slot::ConvocationDate => &mut self.convocation_date,
        }
    }
}

/// Normalize issuance metadata.
///
/// Legacy keys are visited in sorted order and the first non-blank value for
/// a slot is kept, so two bags carrying both `major` and `fieldOfStudy`
/// resolve the same way regardless of how the client ordered them.
pub fn normalize_metadata(
    payload: Option<&MetadataPayload>,
    field_of_study: Option<&str>,
    grade: Option<&str>,
) -> CertificateMetadata {
    let mut out = CertificateMetadata::default();

    match payload {
        Some(MetadataPayload::Academic(academic)) => {
            out.major = render_scalar(academic.major.as_ref());
            out.grade = render_scalar(academic.grade.as_ref());
            out.credit_hours = render_scalar(academic.credit_hours.as_ref());
            out.convocation_date = render_scalar(academic.convocation_date.as_ref());
            for (key, value) in &academic.extra {
                if let (Some(key), Some(value)) = (non_blank(key), render_scalar(Some(value))) {
                    out.extra.insert(key, value);
                }
            }
        }
        Some(MetadataPayload::LegacyDetails { details }) => {
            let sorted: BTreeMap<&String, &Value> = details.iter().collect();
            for (key, value) in sorted {
                let Some(rendered) = render_value(value) else {
                    continue;
                };
                match legacy_slot(key) {
                    Some(slot) => {
                        let target = out.slot_mut(slot);
                        if target.is_none() {
                            *target = Some(rendered);
                        }
                    }
                    None => {
                        if let Some(key) = non_blank(key) {
                            out.extra.insert(key, rendered);
                        }
                    }
                }
            }
        }
        None => {}
    }

    if let Some(major) = field_of_study.and_then(non_blank) {
        out.major = Some(major);
    }
    if let Some(grade) = grade.and_then(non_blank) {
        out.grade = Some(grade);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn legacy(details: Value) -> MetadataPayload {
        serde_json::from_value(json!({"schema": "legacy_details", "details": details})).unwrap()
    }

    #[test]
    fn academic_payload_parses_with_cgpa_alias() {
        let payload: MetadataPayload = serde_json::from_value(json!({
            "schema": "academic",
            "major": "Computer Science",
            "cgpa": 3.8,
            "creditHours": 140,
            "convocationDate": "2025-03-01"
        }))
        .unwrap();
        let meta = normalize_metadata(Some(&payload), None, None);
        assert_eq!(meta.major.as_deref(), Some("Computer Science"));
        assert_eq!(meta.grade.as_deref(), Some("3.8"));
        assert_eq!(meta.credit_hours.as_deref(), Some("140"));
        assert_eq!(meta.convocation_date.as_deref(), Some("2025-03-01"));
    }

    #[test]
    fn academic_payload_rejects_unknown_keys() {
        let result: Result<MetadataPayload, _> =
            serde_json::from_value(json!({"schema": "academic", "mjor": "typo"}));
        assert!(result.is_err());
    }

    #[test]
    fn missing_schema_tag_is_rejected() {
        let result: Result<MetadataPayload, _> = serde_json::from_value(json!({"major": "CSE"}));
        assert!(result.is_err());
    }

    #[test]
    fn legacy_keys_land_in_canonical_slots() {
        let payload = legacy(json!({
            "fieldOfStudy": "EEE",
            "gradeGpa": "3.50",
            "credit_hours": 150,
            "honours": true,
            "advisor": "Dr. Rahman",
            "note": null
        }));
        let meta = normalize_metadata(Some(&payload), None, None);
        assert_eq!(meta.major.as_deref(), Some("EEE"));
        assert_eq!(meta.grade.as_deref(), Some("3.50"));
        assert_eq!(meta.credit_hours.as_deref(), Some("150"));
        assert_eq!(meta.extra.get("honours").map(String::as_str), Some("true"));
        assert_eq!(meta.extra.get("advisor").map(String::as_str), Some("Dr. Rahman"));
        assert!(!meta.extra.contains_key("note"));
    }

    #[test]
    fn explicit_fields_win_over_payload() {
        let payload = legacy(json!({"major": "Physics", "cgpa": "3.1"}));
        let meta = normalize_metadata(Some(&payload), Some("Mathematics"), Some("3.9"));
        assert_eq!(meta.major.as_deref(), Some("Mathematics"));
        assert_eq!(meta.grade.as_deref(), Some("3.9"));
    }

    #[test]
    fn blank_explicit_fields_do_not_erase_payload() {
        let payload = legacy(json!({"major": "Physics"}));
        let meta = normalize_metadata(Some(&payload), Some("   "), None);
        assert_eq!(meta.major.as_deref(), Some("Physics"));
    }

    #[test]
    fn conflicting_legacy_aliases_resolve_by_key_order() {
        let a = legacy(json!({"major": "A", "fieldOfStudy": "B"}));
        let b = legacy(json!({"fieldOfStudy": "B", "major": "A"}));
        let first = normalize_metadata(Some(&a), None, None);
        assert_eq!(first, normalize_metadata(Some(&b), None, None));
        // "fieldOfStudy" sorts before "major".
        assert_eq!(first.major.as_deref(), Some("B"));
    }

    #[test]
    fn nothing_in_nothing_out() {
        let meta = normalize_metadata(None, None, None);
        assert!(meta.is_empty());
        assert_eq!(serde_json::to_value(&meta).unwrap(), json!({}));
    }

    #[test]
    fn normalized_form_round_trips_through_storage_json() {
        let meta = normalize_metadata(None, Some("CSE"), Some("A+"));
        let stored = serde_json::to_value(&meta).unwrap();
        assert_eq!(stored, json!({"major": "CSE", "grade": "A+"}));
        let loaded: CertificateMetadata = serde_json::from_value(stored).unwrap();
        assert_eq!(loaded, meta);
    }
}
