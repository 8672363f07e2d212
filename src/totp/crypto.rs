//! Secret codec: AES-256-GCM encryption of TOTP secrets at rest.
//!
//! Output envelope is `nonce (12 bytes) || ciphertext+tag`, so the same key
//! decrypts any prior ciphertext. The nonce is regenerated from `OsRng` on
//! every call; nonce reuse under one key is the failure mode to avoid.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};

use crate::auth::error::AuthError;

const NONCE_LEN: usize = 12;

/// Encrypt a secret under the externally supplied 32-byte key.
///
/// # Errors
/// Returns `Internal` if the cipher rejects its inputs.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, AuthError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|err| AuthError::Internal(anyhow::anyhow!("encryption failure: {err}")))?;

    let mut envelope = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    envelope.extend_from_slice(&nonce_bytes);
    envelope.extend_from_slice(&ciphertext);
    Ok(envelope)
}

/// Decrypt an envelope produced by [`encrypt`].
///
/// # Errors
/// Returns `Decode` if the envelope is malformed or the integrity tag does
/// not verify (wrong key, truncation, tampering).
pub fn decrypt(key: &[u8; 32], envelope: &[u8]) -> Result<Vec<u8>, AuthError> {
    if envelope.len() < NONCE_LEN {
        return Err(AuthError::Decode);
    }
    let (nonce_bytes, ciphertext) = envelope.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| AuthError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let key = [42u8; 32];
        for plaintext in [&b""[..], b"s", b"my-totp-secret-seed-0123456789"] {
            let envelope = encrypt(&key, plaintext).expect("encrypt");
            assert!(envelope.len() > plaintext.len());
            let decrypted = decrypt(&key, &envelope).expect("decrypt");
            assert_eq!(decrypted, plaintext);
        }
    }

    #[test]
    fn nonces_differ_per_call() {
        let key = [42u8; 32];
        let first = encrypt(&key, b"same").expect("encrypt");
        let second = encrypt(&key, b"same").expect("encrypt");
        assert_ne!(first, second);
    }

    #[test]
    fn wrong_key_fails_with_decode_error() {
        let envelope = encrypt(&[1u8; 32], b"secret").expect("encrypt");
        assert!(matches!(
            decrypt(&[2u8; 32], &envelope),
            Err(AuthError::Decode)
        ));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = [42u8; 32];
        let mut envelope = encrypt(&key, b"secret").expect("encrypt");
        let last = envelope.len() - 1;
        if let Some(byte) = envelope.get_mut(last) {
            *byte ^= 0xFF;
        }
        assert!(matches!(decrypt(&key, &envelope), Err(AuthError::Decode)));
    }

    #[test]
    fn short_envelope_is_malformed() {
        assert!(matches!(
            decrypt(&[0u8; 32], &[0u8; 5]),
            Err(AuthError::Decode)
        ));
    }
}
