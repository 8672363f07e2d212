//! Authentication orchestrator.
//!
//! [`AuthService`] wires the password, token, two-factor, lockout, and audit
//! components into the account-facing operations: registration, login with
//! optional second factor, token rotation, email verification, password
//! reset, and administrative unlock. It is generic over the adapter traits
//! in [`store`] so the full flow runs against in-memory fakes in tests.

pub mod config;
pub mod error;
pub mod password;
pub mod store;
pub mod tokens;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::warn;
use uuid::Uuid;

use crate::audit::{AuditRecorder, RequestMeta};
use crate::lockout::LockoutTracker;
use crate::otp::OtpEngine;
use crate::totp::{Provisioned, TotpEngine};

pub use config::AuthConfig;
pub use error::AuthError;

use store::{CounterCache, CredentialStore, FactorKind, Identity, NewIdentity, Notifier, TokenPurpose};
use tokens::{hash_refresh_token, Claims, TokenPair, TokenSigner};

/// A fully authenticated principal with its freshly issued token pair.
#[derive(Clone, Debug)]
pub struct AuthenticatedSession {
    pub identity: Identity,
    pub tokens: TokenPair,
}

/// Result of a login submission. A second factor, when enabled, splits the
/// flow into a challenge response followed by a second submission carrying
/// the code.
#[derive(Clone, Debug)]
pub enum LoginOutcome {
    TwoFactorRequired { method: FactorKind },
    Authenticated(AuthenticatedSession),
}

#[derive(Clone)]
pub struct AuthService<S, C, N> {
    store: S,
    notifier: N,
    config: AuthConfig,
    signer: TokenSigner,
    totp: TotpEngine<S>,
    otp: OtpEngine<S, C, N>,
    lockout: LockoutTracker<C, N>,
    audit: AuditRecorder<S>,
}

impl<S, C, N> AuthService<S, C, N>
where
    S: CredentialStore + Clone,
    C: CounterCache + Clone,
    N: Notifier + Clone,
{
    #[must_use]
    pub fn new(store: S, cache: C, notifier: N, config: AuthConfig) -> Self {
        let signer = TokenSigner::new(
            config.access_token_secret(),
            config.refresh_token_secret(),
            config.access_token_ttl_seconds(),
            config.refresh_token_ttl_seconds(),
        );
        let totp = TotpEngine::new(
            store.clone(),
            *config.codec_key(),
            config.totp_issuer().to_string(),
        );
        let otp = OtpEngine::new(
            store.clone(),
            cache.clone(),
            notifier.clone(),
            config.otp_ttl_seconds(),
            config.otp_max_attempts(),
            config.otp_max_resends(),
            config.lockout_window_seconds(),
        );
        let lockout = LockoutTracker::new(
            cache,
            notifier.clone(),
            config.lockout_max_attempts(),
            config.lockout_window_seconds(),
        );
        let audit = AuditRecorder::new(store.clone());
        Self {
            store,
            notifier,
            config,
            signer,
            totp,
            otp,
            lockout,
            audit,
        }
    }

    /// Create an identity with the USER role and open its first session.
    /// A verification email is enqueued best-effort; registration succeeds
    /// even when delivery fails.
    ///
    /// # Errors
    /// `Conflict("email")` or `Conflict("username")` on duplicates, with the
    /// email check taking precedence when both collide.
    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
        meta: &RequestMeta,
    ) -> Result<AuthenticatedSession, AuthError> {
        let email = normalize_identifier(email);
        let username = username.trim().to_string();

        if self.store.find_identity_by_email(&email).await?.is_some() {
            return Err(AuthError::Conflict("email"));
        }

        let password_hash = password::hash_password(password).map_err(AuthError::Internal)?;
        let identity = self
            .store
            .create_identity(&NewIdentity {
                email,
                username,
                password_hash,
            })
            .await?;

        if let Err(err) = self.send_email_verification(&identity).await {
            warn!(identity_id = %identity.id, "failed to enqueue verification email: {err}");
        }

        self.audit
            .event(identity.id, "register", None, true, meta, serde_json::json!({}))
            .await;
        self.open_session(&identity).await
    }

    /// Authenticate an identifier/password pair, optionally completing a
    /// second-factor challenge in the same call.
    ///
    /// Lockout is evaluated before the credentials so a locked account
    /// answers `AccountLocked` even to the correct password. Unknown
    /// identifiers and wrong passwords share one failure path.
    ///
    /// # Errors
    /// `AccountLocked`, `InvalidCredentials`, `InvalidTwoFactorCode`,
    /// `TooManyAttempts`, `RateLimited`, or an adapter failure.
    pub async fn login(
        &self,
        identifier: &str,
        password: &str,
        two_factor_code: Option<&str>,
        meta: &RequestMeta,
    ) -> Result<LoginOutcome, AuthError> {
        let submitted = identifier;
        let identifier = normalize_identifier(identifier);
        self.lockout.check_lockout(&identifier).await?;

        let Some(identity) = self.store.find_identity_by_login(&identifier).await? else {
            return self.failed_credentials(submitted, &identifier, None, meta).await;
        };
        let Some(credential) = self.store.get_credential(identity.id).await? else {
            return self
                .failed_credentials(submitted, &identifier, Some(&identity), meta)
                .await;
        };
        if !password::verify_password(password, &credential.password_hash) {
            return self
                .failed_credentials(submitted, &identifier, Some(&identity), meta)
                .await;
        }

        let factors = self.store.enabled_second_factors(identity.id).await?;
        if !factors.is_empty() {
            let Some(code) = two_factor_code else {
                // Challenge phase. Email delivery wins when both kinds are
                // enabled so the user always receives something actionable.
                if factors.iter().any(|factor| factor.kind == FactorKind::Email) {
                    self.otp.issue(identity.id, &identity.email).await?;
                    return Ok(LoginOutcome::TwoFactorRequired {
                        method: FactorKind::Email,
                    });
                }
                return Ok(LoginOutcome::TwoFactorRequired {
                    method: FactorKind::Totp,
                });
            };

            match self.verify_second_factor(&identity, &factors, code).await? {
                Some(method) => {
                    self.audit
                        .event(
                            identity.id,
                            "2fa_verify",
                            Some(method),
                            true,
                            meta,
                            serde_json::json!({}),
                        )
                        .await;
                }
                None => {
                    self.audit
                        .event(
                            identity.id,
                            "2fa_verify",
                            None,
                            false,
                            meta,
                            serde_json::json!({}),
                        )
                        .await;
                    return Err(AuthError::InvalidTwoFactorCode);
                }
            }
        }

        self.store.touch_last_login(identity.id).await?;
        self.audit.login_attempt(submitted, meta, true).await;
        self.lockout
            .reset_attempts(&identifier, meta.origin.as_deref())
            .await?;
        let session = self.open_session(&identity).await?;
        Ok(LoginOutcome::Authenticated(session))
    }

    /// Re-send the emailed login code for a login already in flight. Shaped
    /// identically whether the identifier is unknown, the email factor is
    /// disabled, or no login challenge is pending; a fresh code is only
    /// minted when the password step already produced one.
    ///
    /// # Errors
    /// `RateLimited` when the resend quota is exhausted.
    pub async fn resend_login_otp(&self, identifier: &str) -> Result<(), AuthError> {
        let identifier = normalize_identifier(identifier);
        let Some(identity) = self.store.find_identity_by_login(&identifier).await? else {
            return Ok(());
        };
        let factors = self.store.enabled_second_factors(identity.id).await?;
        if !factors.iter().any(|factor| factor.kind == FactorKind::Email) {
            return Ok(());
        }
        // No pending challenge means no password step happened; answering Ok
        // keeps the response shape while minting nothing.
        if self
            .store
            .find_live_otp_challenge(identity.id)
            .await?
            .is_none()
        {
            return Ok(());
        }
        self.otp.issue(identity.id, &identity.email).await
    }

    /// Rotate a refresh token: the presented token's session is deleted and
    /// a fresh pair with a new session row is issued.
    ///
    /// # Errors
    /// `InvalidRefreshToken` when the token fails validation, its session is
    /// gone or expired, or the identity no longer exists.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthenticatedSession, AuthError> {
        let claims = self.signer.validate_refresh(refresh_token)?;
        let token_hash = hash_refresh_token(refresh_token);
        let session = self
            .store
            .find_session_by_hash(&token_hash)
            .await?
            .ok_or(AuthError::InvalidRefreshToken)?;
        let identity = self
            .store
            .find_identity_by_id(session.identity_id)
            .await?
            .ok_or(AuthError::InvalidRefreshToken)?;
        if claims.identity_id()? != identity.id {
            return Err(AuthError::InvalidRefreshToken);
        }
        self.store.delete_session_by_hash(&token_hash).await?;
        self.open_session(&identity).await
    }

    /// Delete the presented token's session, or every session for the
    /// identity when `everywhere` is set.
    ///
    /// # Errors
    /// `InvalidRefreshToken` when the token fails validation.
    pub async fn logout(&self, refresh_token: &str, everywhere: bool) -> Result<(), AuthError> {
        let claims = self.signer.validate_refresh(refresh_token)?;
        if everywhere {
            self.store.delete_sessions_for(claims.identity_id()?).await?;
        } else {
            self.store
                .delete_session_by_hash(&hash_refresh_token(refresh_token))
                .await?;
        }
        Ok(())
    }

    /// Begin TOTP enrollment for an authenticated identity.
    ///
    /// # Errors
    /// Returns an error if provisioning or the store fails.
    pub async fn totp_setup(
        &self,
        identity_id: Uuid,
        meta: &RequestMeta,
    ) -> Result<Provisioned, AuthError> {
        let identity = self
            .store
            .find_identity_by_id(identity_id)
            .await?
            .ok_or(AuthError::NotFound)?;
        let provisioned = self.totp.provision(&identity, Some(&identity.email)).await?;
        self.audit
            .event(identity_id, "totp_setup", None, true, meta, serde_json::json!({}))
            .await;
        Ok(provisioned)
    }

    /// Confirm TOTP enrollment with a current code. Returns the plaintext
    /// recovery codes, shown this once only.
    ///
    /// # Errors
    /// `InvalidCode` when the code does not match, `NotFound` without a
    /// pending enrollment.
    pub async fn totp_confirm(
        &self,
        identity_id: Uuid,
        code: &str,
        meta: &RequestMeta,
    ) -> Result<Vec<String>, AuthError> {
        let outcome = self.totp.confirm_setup(identity_id, code).await;
        self.audit
            .event(
                identity_id,
                "totp_confirm",
                None,
                outcome.is_ok(),
                meta,
                serde_json::json!({}),
            )
            .await;
        outcome
    }

    /// Enable the emailed one-time-code factor.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn enable_email_2fa(
        &self,
        identity_id: Uuid,
        meta: &RequestMeta,
    ) -> Result<(), AuthError> {
        self.store
            .upsert_second_factor(identity_id, FactorKind::Email, &[], true)
            .await?;
        self.audit
            .event(
                identity_id,
                "2fa_email_enable",
                None,
                true,
                meta,
                serde_json::json!({}),
            )
            .await;
        Ok(())
    }

    /// Disable a second factor. Requires the current password as step-up.
    ///
    /// # Errors
    /// `InvalidCredentials` when the password does not match.
    pub async fn disable_2fa(
        &self,
        identity_id: Uuid,
        kind: FactorKind,
        password: &str,
        meta: &RequestMeta,
    ) -> Result<(), AuthError> {
        let credential = self
            .store
            .get_credential(identity_id)
            .await?
            .ok_or(AuthError::NotFound)?;
        if !password::verify_password(password, &credential.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }
        self.totp.disable(identity_id, kind).await?;
        self.audit
            .event(
                identity_id,
                "2fa_disable",
                Some(match kind {
                    FactorKind::Totp => "totp",
                    FactorKind::Email => "email_otp",
                }),
                true,
                meta,
                serde_json::json!({}),
            )
            .await;
        Ok(())
    }

    /// Issue and dispatch a single-use email-verification token.
    ///
    /// # Errors
    /// Returns an error if the store or the notifier fails.
    pub async fn send_email_verification(&self, identity: &Identity) -> Result<(), AuthError> {
        let token = random_token();
        let expires_at = Utc::now() + Duration::seconds(self.config.action_token_ttl_seconds());
        self.store
            .create_action_token(
                identity.id,
                TokenPurpose::VerifyEmail,
                &hash_action_token(&token),
                expires_at,
            )
            .await?;
        self.notifier
            .send(
                &identity.email,
                "verify_email",
                &serde_json::json!({ "token": token, "username": identity.username }),
            )
            .await
    }

    /// Consume an email-verification token and mark the address verified.
    ///
    /// # Errors
    /// `InvalidCode` when the token is unknown, expired, or already used.
    pub async fn verify_email(&self, token: &str, meta: &RequestMeta) -> Result<(), AuthError> {
        let identity_id = self
            .store
            .consume_action_token(TokenPurpose::VerifyEmail, &hash_action_token(token))
            .await?
            .ok_or(AuthError::InvalidCode)?;
        self.store.mark_email_verified(identity_id).await?;
        self.audit
            .event(
                identity_id,
                "email_verified",
                None,
                true,
                meta,
                serde_json::json!({}),
            )
            .await;
        Ok(())
    }

    /// Start a password reset. Always success-shaped so the endpoint cannot
    /// be used to enumerate accounts; delivery failures are logged only.
    ///
    /// # Errors
    /// Returns an error only when the store fails.
    pub async fn forgot_password(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_identifier(email);
        let Some(identity) = self.store.find_identity_by_email(&email).await? else {
            return Ok(());
        };
        let token = random_token();
        let expires_at = Utc::now() + Duration::seconds(self.config.action_token_ttl_seconds());
        self.store
            .create_action_token(
                identity.id,
                TokenPurpose::ResetPassword,
                &hash_action_token(&token),
                expires_at,
            )
            .await?;
        if let Err(err) = self
            .notifier
            .send(
                &identity.email,
                "password_reset",
                &serde_json::json!({ "token": token, "username": identity.username }),
            )
            .await
        {
            warn!(identity_id = %identity.id, "failed to send password reset: {err}");
        }
        Ok(())
    }

    /// Complete a password reset: rotate the hash, drop every session, and
    /// clear any lockout on the account.
    ///
    /// # Errors
    /// `InvalidCode` when the token is unknown, expired, or already used.
    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
        meta: &RequestMeta,
    ) -> Result<(), AuthError> {
        let identity_id = self
            .store
            .consume_action_token(TokenPurpose::ResetPassword, &hash_action_token(token))
            .await?
            .ok_or(AuthError::InvalidCode)?;
        let hash = password::hash_password(new_password).map_err(AuthError::Internal)?;
        self.store.update_password_hash(identity_id, &hash).await?;
        self.store.delete_sessions_for(identity_id).await?;
        // A lock may have accrued under either login form; clear both.
        if let Some(identity) = self.store.find_identity_by_id(identity_id).await? {
            self.lockout.unlock_account(&identity.email).await?;
            self.lockout.unlock_account(&identity.username).await?;
        }
        self.audit
            .event(
                identity_id,
                "password_reset",
                None,
                true,
                meta,
                serde_json::json!({}),
            )
            .await;
        Ok(())
    }

    /// Administrative unlock of a locked identifier. Role enforcement is the
    /// caller's responsibility.
    ///
    /// # Errors
    /// Returns an error if the cache fails.
    pub async fn unlock_account(
        &self,
        identifier: &str,
        actor_id: Uuid,
        meta: &RequestMeta,
    ) -> Result<(), AuthError> {
        let identifier = normalize_identifier(identifier);
        self.lockout.unlock_account(&identifier).await?;
        self.audit
            .event(
                actor_id,
                "account_unlock",
                None,
                true,
                meta,
                serde_json::json!({ "identifier": identifier }),
            )
            .await;
        Ok(())
    }

    /// Validate a bearer access token.
    ///
    /// # Errors
    /// `InvalidCredentials` on any validation failure.
    pub fn verify_access_token(&self, token: &str) -> Result<Claims, AuthError> {
        self.signer.validate_access(token)
    }

    /// The attempt row keeps the identifier as typed; lockout counters use
    /// the normalized form.
    async fn failed_credentials(
        &self,
        submitted: &str,
        identifier: &str,
        identity: Option<&Identity>,
        meta: &RequestMeta,
    ) -> Result<LoginOutcome, AuthError> {
        self.audit.login_attempt(submitted, meta, false).await;
        self.lockout
            .record_failure(
                identifier,
                meta.origin.as_deref(),
                identity.map(|identity| identity.email.as_str()),
            )
            .await?;
        Err(AuthError::InvalidCredentials)
    }

    /// Ordered verification: TOTP, then a recovery code, then the emailed
    /// code. Attempt quotas surface as `TooManyAttempts`; every other
    /// mismatch collapses to `None`.
    async fn verify_second_factor(
        &self,
        identity: &Identity,
        factors: &[store::SecondFactor],
        code: &str,
    ) -> Result<Option<&'static str>, AuthError> {
        if factors.iter().any(|factor| factor.kind == FactorKind::Totp) {
            if self.totp.verify(identity.id, code).await? {
                return Ok(Some("totp"));
            }
            if self.totp.verify_recovery_code(identity.id, code).await? {
                return Ok(Some("recovery_code"));
            }
        }
        if factors.iter().any(|factor| factor.kind == FactorKind::Email) {
            match self.otp.verify(identity.id, code).await {
                Ok(()) => return Ok(Some("email_otp")),
                Err(AuthError::TooManyAttempts) => return Err(AuthError::TooManyAttempts),
                Err(AuthError::NotFound | AuthError::InvalidCode) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }

    async fn open_session(&self, identity: &Identity) -> Result<AuthenticatedSession, AuthError> {
        let tokens = self.signer.issue_pair(identity)?;
        let expires_at = Utc::now() + Duration::seconds(self.config.refresh_token_ttl_seconds());
        self.store
            .create_session(
                identity.id,
                &hash_refresh_token(&tokens.refresh_token),
                expires_at,
            )
            .await?;
        Ok(AuthenticatedSession {
            identity: identity.clone(),
            tokens,
        })
    }
}

fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

/// 256-bit URL-safe token for emailed verification and reset links.
fn random_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Action tokens are stored hashed, like refresh tokens.
fn hash_action_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}
