//! Account lockout tracker.
//!
//! Failure counters are kept per identifier (as typed) and per origin
//! address, independently, under `lockout:user:<identifier>` and
//! `lockout:ip:<address>`. Crossing the threshold sets a lock flag
//! `lockout:locked:<identifier>` whose TTL is the lockout duration.
//! All state lives in the cache; losing it resets the lockouts, which is
//! accepted degraded behavior.

use tracing::warn;

use crate::auth::error::AuthError;
use crate::auth::store::{CounterCache, Notifier};

const LOCKOUT_TEMPLATE: &str = "account_locked";

fn user_key(identifier: &str) -> String {
    format!("lockout:user:{identifier}")
}

fn ip_key(address: &str) -> String {
    format!("lockout:ip:{address}")
}

fn locked_key(identifier: &str) -> String {
    format!("lockout:locked:{identifier}")
}

#[derive(Clone)]
pub struct LockoutTracker<C, N> {
    cache: C,
    notifier: N,
    max_attempts: u32,
    /// Counter TTL and lock duration, in seconds.
    window_seconds: u64,
}

impl<C, N> LockoutTracker<C, N>
where
    C: CounterCache,
    N: Notifier,
{
    #[must_use]
    pub fn new(cache: C, notifier: N, max_attempts: u32, window_seconds: u64) -> Self {
        Self {
            cache,
            notifier,
            max_attempts,
            window_seconds,
        }
    }

    /// Record a failed attempt. When the identifier's counter reaches the
    /// threshold the account transitions to LOCKED and, if a destination is
    /// supplied, a lockout notice is dispatched (failures logged, not
    /// propagated — the lock itself already took effect).
    ///
    /// # Errors
    /// Returns an error if the cache fails.
    pub async fn record_failure(
        &self,
        identifier: &str,
        origin: Option<&str>,
        notice_to: Option<&str>,
    ) -> Result<(), AuthError> {
        let count = self.counter(&user_key(identifier)).await? + 1;
        self.cache
            .set(&user_key(identifier), &count.to_string(), self.window_seconds)
            .await?;

        if let Some(address) = origin {
            let ip_count = self.counter(&ip_key(address)).await? + 1;
            self.cache
                .set(&ip_key(address), &ip_count.to_string(), self.window_seconds)
                .await?;
        }

        if count >= self.max_attempts {
            self.cache
                .set(&locked_key(identifier), "1", self.window_seconds)
                .await?;
            if let Some(destination) = notice_to {
                let context = serde_json::json!({
                    "identifier": identifier,
                    "minutes": minutes_from_seconds(self.window_seconds as i64),
                });
                if let Err(err) = self
                    .notifier
                    .send(destination, LOCKOUT_TEMPLATE, &context)
                    .await
                {
                    warn!(identifier, "failed to send lockout notice: {err}");
                }
            }
        }
        Ok(())
    }

    /// Fail with `AccountLocked` (carrying remaining minutes) while the lock
    /// flag is present; return normally otherwise.
    ///
    /// # Errors
    /// `AccountLocked` when locked; cache failures otherwise.
    pub async fn check_lockout(&self, identifier: &str) -> Result<(), AuthError> {
        if self.cache.get(&locked_key(identifier)).await?.is_none() {
            return Ok(());
        }
        let remaining = self
            .cache
            .ttl(&locked_key(identifier))
            .await?
            .unwrap_or(self.window_seconds as i64);
        Err(AuthError::AccountLocked {
            minutes: minutes_from_seconds(remaining),
        })
    }

    /// Clear both counters after a fully successful authentication.
    ///
    /// # Errors
    /// Returns an error if the cache fails.
    pub async fn reset_attempts(
        &self,
        identifier: &str,
        origin: Option<&str>,
    ) -> Result<(), AuthError> {
        self.cache.del(&user_key(identifier)).await?;
        if let Some(address) = origin {
            self.cache.del(&ip_key(address)).await?;
        }
        Ok(())
    }

    /// Administrative override: clear the lock flag and the failure counter.
    ///
    /// # Errors
    /// Returns an error if the cache fails.
    pub async fn unlock_account(&self, identifier: &str) -> Result<(), AuthError> {
        self.cache.del(&locked_key(identifier)).await?;
        self.cache.del(&user_key(identifier)).await?;
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

/// Ceiling division so a 61-second remainder reads as 2 minutes.
fn minutes_from_seconds(seconds: i64) -> i64 {
    (seconds.max(0) + 59) / 60
}
