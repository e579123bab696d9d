//! # Canonical Serialization
//!
//! [`CanonicalBytes`] is the only input accepted by
//! [`sha256_digest`](crate::digest::sha256_digest). Values are converted to a
//! `serde_json::Value`, checked, and written back out with:
//!
//! 1. Object keys sorted lexicographically (serde_json's default `Map` is ordered).
//! 2. Compact separators, no insignificant whitespace.
//! 3. Floats rejected, since `3.10` and `3.1` would otherwise hash differently
//!    from what a reader considers the same grade.

use serde::Serialize;
use serde_json::Value;

use crate::error::CanonicalizationError;

/// Bytes produced exclusively by canonical serialization.
///
/// The inner buffer is private; the only constructor is [`CanonicalBytes::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Canonicalize any serializable value.
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        reject_floats(&value)?;
        Ok(Self(serde_json::to_vec(&value)?))
    }

    /// Access the canonical bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume and return the inner byte vector.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

fn reject_floats(value: &Value) -> Result<(), CanonicalizationError> {
    match value {
        Value::Number(n) if !n.is_i64() && !n.is_u64() => Err(
            CanonicalizationError::FloatRejected(n.as_f64().unwrap_or(f64::NAN)),
        ),
        Value::Array(items) => items.iter().try_for_each(reject_floats),
        Value::Object(map) => map.values().try_for_each(reject_floats),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_are_sorted_and_compact() {
        let cb = CanonicalBytes::new(&json!({"b": 1, "a": {"z": true, "m": null}})).unwrap();
        assert_eq!(
            std::str::from_utf8(cb.as_bytes()).unwrap(),
            r#"{"a":{"m":null,"z":true},"b":1}"#
        );
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let mut first = serde_json::Map::new();
        first.insert("major".into(), json!("CSE"));
        first.insert("grade".into(), json!("A"));
        let mut second = serde_json::Map::new();
        second.insert("grade".into(), json!("A"));
        second.insert("major".into(), json!("CSE"));
        assert_eq!(
            CanonicalBytes::new(&first).unwrap(),
            CanonicalBytes::new(&second).unwrap()
        );
    }

    #[test]
    fn nested_float_is_rejected() {
        let err = CanonicalBytes::new(&json!({"outer": [1, {"cgpa": 3.75}]})).unwrap_err();
        assert!(matches!(err, CanonicalizationError::FloatRejected(f) if f == 3.75));
    }

    #[test]
    fn integers_and_strings_pass() {
        let cb = CanonicalBytes::new(&json!({"credits": 140, "cgpa": "3.75"})).unwrap();
        assert_eq!(cb.into_bytes(), br#"{"cgpa":"3.75","credits":140}"#.to_vec());
    }
}
