//! Password hashing with Argon2id. Plaintext never reaches the store.

use anyhow::{Context, Result};
use argon2::{
    password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use rand::rngs::OsRng;

/// Hash a password for storage.
///
/// # Errors
/// Returns an error if the hasher rejects its inputs.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow::anyhow!("failed to hash password: {err}"))?
        .to_string();
    Ok(hash)
}

/// Constant-shape verification: a malformed stored hash verifies as false
/// rather than erroring, so the caller's failure path stays uniform.
#[must_use]
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Hash an arbitrary short code (email OTP) with the same memory-hard hash.
///
/// # Errors
/// Returns an error if the hasher rejects its inputs.
pub fn hash_code(code: &str) -> Result<String> {
    hash_password(code).context("failed to hash one-time code")
}

/// Verify a short code against its stored hash.
#[must_use]
pub fn verify_code(code: &str, stored_hash: &str) -> bool {
    verify_password(code, stored_hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_password("Secr3t!23").expect("hash");
        assert!(verify_password("Secr3t!23", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn hashes_are_salted() {
        let first = hash_password("same").expect("hash");
        let second = hash_password("same").expect("hash");
        assert_ne!(first, second);
    }

    #[test]
    fn malformed_hash_verifies_false() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn code_hash_round_trip() {
        let hash = hash_code("482913").expect("hash");
        assert!(verify_code("482913", &hash));
        assert!(!verify_code("482914", &hash));
    }
}
