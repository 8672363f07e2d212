//! TOTP enrollment and verification over the credential store.

use totp_rs::{Algorithm, Secret, TOTP};
use uuid::Uuid;

use crate::auth::error::AuthError;
use crate::auth::store::{CredentialStore, FactorKind, Identity};

use super::{crypto, recovery::RecoveryCodeBatch};

const TOTP_DIGITS: usize = 6;
const TOTP_STEP_SECONDS: u64 = 30;
/// Steps of tolerance either side of the current window, to absorb clock drift.
const TOTP_SKEW: u8 = 2;

/// Result of starting enrollment: shown to the user exactly once.
#[derive(Clone, Debug)]
pub struct Provisioned {
    pub secret_base32: String,
    pub otpauth_url: String,
}

#[derive(Clone)]
pub struct TotpEngine<S> {
    store: S,
    codec_key: [u8; 32],
    issuer: String,
}

impl<S: CredentialStore> TotpEngine<S> {
    #[must_use]
    pub fn new(store: S, codec_key: [u8; 32], issuer: String) -> Self {
        Self {
            store,
            codec_key,
            issuer,
        }
    }

    /// Begin enrollment: generate a fresh secret, encrypt and store it
    /// disabled, and return the base32 secret plus the otpauth URI.
    /// Re-provisioning overwrites any prior unconfirmed secret.
    ///
    /// # Errors
    /// Returns an error if secret generation, encryption, or the store fails.
    pub async fn provision(
        &self,
        identity: &Identity,
        label: Option<&str>,
    ) -> Result<Provisioned, AuthError> {
        let secret = Secret::generate_secret();
        let secret_bytes = secret
            .to_bytes()
            .map_err(|err| AuthError::Internal(anyhow::anyhow!("secret generation: {err:?}")))?;

        let account = label.unwrap_or(&identity.email);
        let totp = build_totp(secret_bytes.clone(), &self.issuer, account)?;

        let ciphertext = crypto::encrypt(&self.codec_key, &secret_bytes)?;
        self.store
            .upsert_second_factor(identity.id, FactorKind::Totp, &ciphertext, false)
            .await?;

        Ok(Provisioned {
            secret_base32: totp.get_secret_base32(),
            otpauth_url: totp.get_url(),
        })
    }

    /// Confirm enrollment by verifying the first code. On success the factor
    /// is enabled and a fresh recovery-code batch is returned — the plaintext
    /// codes are never persisted or retrievable again.
    ///
    /// # Errors
    /// `NotFound` when provisioning was never started, `InvalidCode` when the
    /// candidate does not match the current time window.
    pub async fn confirm_setup(
        &self,
        identity_id: Uuid,
        candidate: &str,
    ) -> Result<Vec<String>, AuthError> {
        let factor = self
            .store
            .find_second_factor(identity_id, FactorKind::Totp)
            .await?
            .ok_or(AuthError::NotFound)?;

        if !self.check_code(&factor.secret, candidate)? {
            return Err(AuthError::InvalidCode);
        }

        let batch = RecoveryCodeBatch::generate().map_err(AuthError::Internal)?;
        self.store
            .replace_recovery_hashes(identity_id, &batch.code_hashes)
            .await?;
        self.store
            .set_second_factor_enabled(identity_id, FactorKind::Totp, true)
            .await?;

        Ok(batch.codes)
    }

    /// Verify a code against the enabled factor. Absence of an enabled TOTP
    /// factor is `Ok(false)`, not an error.
    ///
    /// # Errors
    /// Returns an error if the store or decryption fails.
    pub async fn verify(&self, identity_id: Uuid, candidate: &str) -> Result<bool, AuthError> {
        let Some(factor) = self
            .store
            .find_second_factor(identity_id, FactorKind::Totp)
            .await?
        else {
            return Ok(false);
        };
        if !factor.enabled {
            return Ok(false);
        }
        self.check_code(&factor.secret, candidate)
    }

    /// Single-use recovery-code verification: the first matching hash is
    /// removed from the set before returning true. Read-then-write; a
    /// concurrent race collapses to one winner at the store.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn verify_recovery_code(
        &self,
        identity_id: Uuid,
        candidate: &str,
    ) -> Result<bool, AuthError> {
        let Some(factor) = self
            .store
            .find_second_factor(identity_id, FactorKind::Totp)
            .await?
        else {
            return Ok(false);
        };
        if !factor.enabled {
            return Ok(false);
        }

        let hashes = self.store.list_recovery_hashes(identity_id).await?;
        for hash in &hashes {
            if super::recovery::matches_hash(candidate, hash) {
                return self.store.remove_recovery_hash(identity_id, hash).await;
            }
        }
        Ok(false)
    }

    /// Disable a factor without deleting its secret; the data survives for a
    /// future re-enable.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn disable(&self, identity_id: Uuid, kind: FactorKind) -> Result<(), AuthError> {
        self.store
            .set_second_factor_enabled(identity_id, kind, false)
            .await
    }

    fn check_code(&self, encrypted_secret: &[u8], candidate: &str) -> Result<bool, AuthError> {
        let secret_bytes = crypto::decrypt(&self.codec_key, encrypted_secret)?;
        let totp = build_totp(secret_bytes, &self.issuer, "account")?;
        Ok(totp.check_current(candidate.trim()).unwrap_or(false))
    }
}

fn build_totp(secret_bytes: Vec<u8>, issuer: &str, account: &str) -> Result<TOTP, AuthError> {
    TOTP::new(
        Algorithm::SHA1,
        TOTP_DIGITS,
        TOTP_SKEW,
        TOTP_STEP_SECONDS,
        secret_bytes,
        Some(issuer.to_string()),
        account.to_string(),
    )
    .map_err(|err| AuthError::Internal(anyhow::anyhow!("totp init: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::Role;
    use crate::testing::MemStore;

    const KEY: [u8; 32] = [9u8; 32];

    fn engine() -> (TotpEngine<MemStore>, MemStore) {
        let store = MemStore::new();
        (
            TotpEngine::new(store.clone(), KEY, "vigilo".to_string()),
            store,
        )
    }

    fn identity() -> Identity {
        Identity {
            id: Uuid::new_v4(),
            email: "a@x.com".to_string(),
            username: "a".to_string(),
            role: Role::User,
            email_verified_at: None,
        }
    }

    fn current_code(secret_base32: &str) -> String {
        let secret = Secret::Encoded(secret_base32.to_string())
            .to_bytes()
            .expect("decode secret");
        build_totp(secret, "vigilo", "a@x.com")
            .expect("totp")
            .generate_current()
            .expect("code")
    }

    #[tokio::test]
    async fn provision_then_confirm_enables_factor() {
        let (engine, store) = engine();
        let identity = identity();

        let provisioned = engine.provision(&identity, None).await.expect("provision");
        assert!(provisioned.otpauth_url.starts_with("otpauth://totp/"));
        assert!(provisioned.otpauth_url.contains("issuer=vigilo"));

        // Not enabled until the setup code is verified.
        assert!(!engine
            .verify(identity.id, &current_code(&provisioned.secret_base32))
            .await
            .expect("verify"));

        let codes = engine
            .confirm_setup(identity.id, &current_code(&provisioned.secret_base32))
            .await
            .expect("confirm");
        assert_eq!(codes.len(), 10);
        assert_eq!(store.recovery_hash_count(identity.id), 10);

        assert!(engine
            .verify(identity.id, &current_code(&provisioned.secret_base32))
            .await
            .expect("verify"));
    }

    #[tokio::test]
    async fn confirm_without_provision_is_not_found() {
        let (engine, _store) = engine();
        assert!(matches!(
            engine.confirm_setup(Uuid::new_v4(), "000000").await,
            Err(AuthError::NotFound)
        ));
    }

    #[tokio::test]
    async fn confirm_with_wrong_code_fails() {
        let (engine, _store) = engine();
        let identity = identity();
        engine.provision(&identity, None).await.expect("provision");
        assert!(matches!(
            engine.confirm_setup(identity.id, "000000").await,
            Err(AuthError::InvalidCode)
        ));
    }

    #[tokio::test]
    async fn reprovision_overwrites_unconfirmed_secret() {
        let (engine, _store) = engine();
        let identity = identity();
        let first = engine.provision(&identity, None).await.expect("provision");
        let second = engine.provision(&identity, None).await.expect("provision");
        assert_ne!(first.secret_base32, second.secret_base32);
        // Only the latest secret confirms.
        assert!(matches!(
            engine
                .confirm_setup(identity.id, &current_code(&first.secret_base32))
                .await,
            Err(AuthError::InvalidCode)
        ));
        engine
            .confirm_setup(identity.id, &current_code(&second.secret_base32))
            .await
            .expect("confirm");
    }

    #[tokio::test]
    async fn verify_without_factor_is_false_not_error() {
        let (engine, _store) = engine();
        assert!(!engine
            .verify(Uuid::new_v4(), "123456")
            .await
            .expect("verify"));
    }

    #[tokio::test]
    async fn recovery_code_is_single_use() {
        let (engine, store) = engine();
        let identity = identity();
        let provisioned = engine.provision(&identity, None).await.expect("provision");
        let codes = engine
            .confirm_setup(identity.id, &current_code(&provisioned.secret_base32))
            .await
            .expect("confirm");

        let code = codes.first().expect("code");
        assert!(engine
            .verify_recovery_code(identity.id, code)
            .await
            .expect("first use"));
        assert_eq!(store.recovery_hash_count(identity.id), 9);
        assert!(!engine
            .verify_recovery_code(identity.id, code)
            .await
            .expect("second use"));
    }

    #[tokio::test]
    async fn disable_keeps_secret_but_stops_verification() {
        let (engine, store) = engine();
        let identity = identity();
        let provisioned = engine.provision(&identity, None).await.expect("provision");
        engine
            .confirm_setup(identity.id, &current_code(&provisioned.secret_base32))
            .await
            .expect("confirm");

        engine
            .disable(identity.id, FactorKind::Totp)
            .await
            .expect("disable");

        assert!(!engine
            .verify(identity.id, &current_code(&provisioned.secret_base32))
            .await
            .expect("verify"));
        // Secret survives for a future re-enable.
        let factor = store
            .find_second_factor(identity.id, FactorKind::Totp)
            .await
            .expect("find")
            .expect("factor");
        assert!(!factor.secret.is_empty());
    }
}
