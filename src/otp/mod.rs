//! Email one-time-password engine.
//!
//! At most one live challenge per identity: issuing a new code supersedes
//! any prior one, and only the most recent is verifiable. Attempt and resend
//! quotas live in the counter cache under `otp:attempts:<id>` and
//! `otp:resend:<id>`.

use chrono::{Duration as ChronoDuration, Utc};
use rand::{rngs::OsRng, Rng};
use uuid::Uuid;

use crate::auth::error::AuthError;
use crate::auth::password::{hash_code, verify_code};
use crate::auth::store::{CounterCache, CredentialStore, Notifier};

const OTP_TEMPLATE: &str = "otp_code";

fn attempts_key(identity_id: Uuid) -> String {
    format!("otp:attempts:{identity_id}")
}

fn resend_key(identity_id: Uuid) -> String {
    format!("otp:resend:{identity_id}")
}

#[derive(Clone)]
pub struct OtpEngine<S, C, N> {
    store: S,
    cache: C,
    notifier: N,
    ttl_seconds: i64,
    max_attempts: u32,
    max_resends: u32,
    /// TTL for both quota counters; matches the lockout window.
    window_seconds: u64,
}

impl<S, C, N> OtpEngine<S, C, N>
where
    S: CredentialStore,
    C: CounterCache,
    N: Notifier,
{
    #[must_use]
    pub fn new(
        store: S,
        cache: C,
        notifier: N,
        ttl_seconds: i64,
        max_attempts: u32,
        max_resends: u32,
        window_seconds: u64,
    ) -> Self {
        Self {
            store,
            cache,
            notifier,
            ttl_seconds,
            max_attempts,
            max_resends,
            window_seconds,
        }
    }

    /// Issue a fresh 6-digit challenge and dispatch it by message.
    ///
    /// Delivery failure propagates: the caller must know the challenge never
    /// reached the user. The challenge row is left behind and expires.
    ///
    /// # Errors
    /// `RateLimited` when the resend quota is exhausted; store, hashing, or
    /// delivery failures otherwise.
    pub async fn issue(&self, identity_id: Uuid, destination: &str) -> Result<(), AuthError> {
        let resends = self.counter(&resend_key(identity_id)).await?;
        if resends >= self.max_resends {
            return Err(AuthError::RateLimited);
        }

        // Uniform over the full 6-digit range from a CSPRNG.
        let code = format!("{}", OsRng.gen_range(100_000..=999_999));
        let code_hash = hash_code(&code).map_err(AuthError::Internal)?;

        self.store.delete_otp_challenges(identity_id).await?;
        let expires_at = Utc::now() + ChronoDuration::seconds(self.ttl_seconds);
        self.store
            .create_otp_challenge(identity_id, &code_hash, expires_at)
            .await?;

        let context = serde_json::json!({
            "code": code,
            "expires_minutes": self.ttl_seconds / 60,
        });
        self.notifier
            .send(destination, OTP_TEMPLATE, &context)
            .await?;

        self.cache
            .set(
                &resend_key(identity_id),
                &(resends + 1).to_string(),
                self.window_seconds,
            )
            .await?;
        Ok(())
    }

    /// Verify a candidate against the live challenge.
    ///
    /// # Errors
    /// `TooManyAttempts` when the attempt quota is exhausted (checked before
    /// the challenge is even loaded), `NotFound` when no live challenge
    /// exists, `InvalidCode` on mismatch.
    pub async fn verify(&self, identity_id: Uuid, candidate: &str) -> Result<(), AuthError> {
        let attempts = self.counter(&attempts_key(identity_id)).await?;
        if attempts >= self.max_attempts {
            return Err(AuthError::TooManyAttempts);
        }

        let challenge = self
            .store
            .find_live_otp_challenge(identity_id)
            .await?
            .ok_or(AuthError::NotFound)?;

        // Counted before the comparison so a crashed request still burns one.
        self.store.bump_otp_challenge_attempts(identity_id).await?;

        if !verify_code(candidate.trim(), &challenge.code_hash) {
            self.cache
                .set(
                    &attempts_key(identity_id),
                    &(attempts + 1).to_string(),
                    self.window_seconds,
                )
                .await?;
            return Err(AuthError::InvalidCode);
        }

        self.store.delete_otp_challenges(identity_id).await?;
        self.cache.del(&attempts_key(identity_id)).await?;
        self.cache.del(&resend_key(identity_id)).await?;
        Ok(())
    }

    async fn counter(&self, key: &str) -> Result<u32, AuthError> {
        Ok(self
            .cache
            .get(key)
            .await?
            .and_then(|value| value.parse().ok())
            .unwrap_or(0))
    }
}
