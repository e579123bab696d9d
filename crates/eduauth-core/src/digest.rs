//! # SHA-256 Digests
//!
//! Two entry points. [`sha256_digest`] hashes [`CanonicalBytes`] and is used
//! for credential fingerprints. [`sha256_raw`] hashes plain bytes and is used
//! where the input is already a normalized string, such as an identity number
//! or a session secret.

use sha2::{Digest, Sha256};

use crate::canonical::CanonicalBytes;

/// A 32-byte SHA-256 digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest {
    /// The raw digest value.
    pub bytes: [u8; 32],
}

impl ContentDigest {
    /// Return the digest as a lowercase hex string (64 characters).
    pub fn to_hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Hash canonical bytes.
pub fn sha256_digest(canonical: &CanonicalBytes) -> ContentDigest {
    sha256_raw(canonical.as_bytes())
}

/// Hash arbitrary bytes.
pub fn sha256_raw(data: &[u8]) -> ContentDigest {
    let out = Sha256::digest(data);
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&out);
    ContentDigest { bytes }
}

/// Whether `s` is exactly 64 lowercase hex characters.
pub(crate) fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
