//! Recovery code generation and verification.
//!
//! Ten single-use backup codes per enrollment, 8 lowercase hex characters
//! each, Argon2id-hashed at rest. Plaintext codes are returned exactly once.

use anyhow::Result;
use rand::{rngs::OsRng, RngCore};

use crate::auth::password::{hash_code, verify_code};

const RECOVERY_CODE_COUNT: usize = 10;
const RECOVERY_CODE_BYTES: usize = 4;

/// A freshly generated recovery-code batch (plaintext + hashes).
#[derive(Debug)]
pub struct RecoveryCodeBatch {
    pub codes: Vec<String>,
    pub code_hashes: Vec<String>,
}

impl RecoveryCodeBatch {
    /// Generate a new batch from the OS entropy source.
    ///
    /// # Errors
    /// Returns an error if hashing fails.
    pub fn generate() -> Result<Self> {
        let mut codes = Vec::with_capacity(RECOVERY_CODE_COUNT);
        let mut code_hashes = Vec::with_capacity(RECOVERY_CODE_COUNT);
        for _ in 0..RECOVERY_CODE_COUNT {
            let code = generate_code();
            code_hashes.push(hash_code(&code)?);
            codes.push(code);
        }
        Ok(Self { codes, code_hashes })
    }
}

/// Case-insensitive candidate normalization before hash comparison.
#[must_use]
pub fn normalize_recovery_code(input: &str) -> String {
    input.trim().to_lowercase()
}

/// Verify a candidate against one stored hash.
#[must_use]
pub fn matches_hash(candidate: &str, stored_hash: &str) -> bool {
    verify_code(&normalize_recovery_code(candidate), stored_hash)
}

fn generate_code() -> String {
    let mut raw = [0u8; RECOVERY_CODE_BYTES];
    OsRng.fill_bytes(&mut raw);
    raw.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_has_ten_hex_codes() {
        let batch = RecoveryCodeBatch::generate().expect("batch");
        assert_eq!(batch.codes.len(), 10);
        assert_eq!(batch.code_hashes.len(), 10);
        for code in &batch.codes {
            assert_eq!(code.len(), 8);
            assert!(code.chars().all(|ch| ch.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn codes_verify_against_their_own_hash_only() {
        let batch = RecoveryCodeBatch::generate().expect("batch");
        let code = batch.codes.first().expect("code");
        let hash = batch.code_hashes.first().expect("hash");
        assert!(matches_hash(code, hash));
        assert!(!matches_hash("00000000", hash) || code == "00000000");
    }

    #[test]
    fn normalization_ignores_case_and_whitespace() {
        assert_eq!(normalize_recovery_code(" AB12cd34 "), "ab12cd34");
    }
}
