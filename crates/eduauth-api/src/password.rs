//! # Password Hashing
//!
//! Argon2id PHC strings with a fresh random salt per password. Hashing and
//! verification run on the blocking pool so a login burst cannot stall the
//! async runtime.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand_core::OsRng;
use thiserror::Error;
use zeroize::Zeroizing;

/// Passwords shorter than this are rejected at registration.
pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("invalid argon2 parameters: {0}")]
    Params(String),
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("password worker failed: {0}")]
    Worker(String),
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub memory_kib: u32,
    pub iterations: u32,
}

impl Default for PasswordPolicy {
    /// The argon2 crate's recommended defaults (19 MiB, 2 passes).
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
        }
    }
}

impl PasswordPolicy {
    /// The cheapest parameters argon2 accepts. Tests and local tooling only.
    pub fn minimal() -> Self {
        Self {
            memory_kib: Params::MIN_M_COST,
            iterations: Params::MIN_T_COST,
        }
    }

    fn hasher(&self) -> Result<Argon2<'static>, PasswordError> {
        let params = Params::new(self.memory_kib, self.iterations, 1, None)
            .map_err(|e| PasswordError::Params(e.to_string()))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Hash `plain` into a PHC string.
    pub fn hash_blocking(&self, plain: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        self.hasher()?
            .hash_password(plain.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| PasswordError::Hash(e.to_string()))
    }

    /// Hash on the blocking pool.
    pub async fn hash(&self, plain: Zeroizing<String>) -> Result<String, PasswordError> {
        let policy = *self;
        tokio::task::spawn_blocking(move || policy.hash_blocking(&plain))
            .await
            .map_err(|e| PasswordError::Worker(e.to_string()))?
    }
}

/// Check `plain` against a stored PHC string. Cost parameters come from the
/// stored hash. Malformed hashes never match.
pub fn verify_blocking(plain: &str, phc: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(parsed) => Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// [`verify_blocking`] on the blocking pool. A worker failure counts as a mismatch.
pub async fn verify(plain: Zeroizing<String>, phc: String) -> bool {
    tokio::task::spawn_blocking(move || verify_blocking(&plain, &phc))
        .await
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let policy = PasswordPolicy::minimal();
        let phc = policy.hash_blocking("correct horse").unwrap();
        assert!(phc.starts_with("$argon2id$"));
        assert!(verify_blocking("correct horse", &phc));
        assert!(!verify_blocking("wrong horse", &phc));
    }

    #[test]
    fn salts_differ_per_hash() {
        let policy = PasswordPolicy::minimal();
        let a = policy.hash_blocking("same password").unwrap();
        let b = policy.hash_blocking("same password").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_hash_never_matches() {
        assert!(!verify_blocking("anything", "not-a-phc-string"));
        assert!(!verify_blocking("", ""));
    }

    #[tokio::test]
    async fn async_wrappers_agree() {
        let policy = PasswordPolicy::minimal();
        let phc = policy.hash(Zeroizing::new("s3cret-pass".into())).await.unwrap();
        assert!(verify(Zeroizing::new("s3cret-pass".into()), phc.clone()).await);
        assert!(!verify(Zeroizing::new("other".into()), phc).await);
    }
}
