//! Authentication policy configuration.
//!
//! All thresholds and lifetimes are explicit fields so the same orchestrator
//! can run with different policies in tests and in production.

use secrecy::{ExposeSecret, SecretString};

const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_LOCKOUT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_LOCKOUT_WINDOW_SECONDS: u64 = 15 * 60;
const DEFAULT_OTP_TTL_SECONDS: i64 = 5 * 60;
const DEFAULT_OTP_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_OTP_MAX_RESENDS: u32 = 3;
const DEFAULT_ACTION_TOKEN_TTL_SECONDS: i64 = 30 * 60;
const DEFAULT_TOTP_ISSUER: &str = "vigilo";

#[derive(Clone)]
pub struct AuthConfig {
    access_token_secret: SecretString,
    refresh_token_secret: SecretString,
    /// 32-byte key for the secret codec, never derived from user input.
    codec_key: [u8; 32],
    access_token_ttl_seconds: i64,
    refresh_token_ttl_seconds: i64,
    lockout_max_attempts: u32,
    /// Window for failure counters and duration of the lock flag.
    lockout_window_seconds: u64,
    otp_ttl_seconds: i64,
    otp_max_attempts: u32,
    otp_max_resends: u32,
    action_token_ttl_seconds: i64,
    totp_issuer: String,
}

impl AuthConfig {
    #[must_use]
    pub fn new(
        access_token_secret: SecretString,
        refresh_token_secret: SecretString,
        codec_key: [u8; 32],
    ) -> Self {
        Self {
            access_token_secret,
            refresh_token_secret,
            codec_key,
            access_token_ttl_seconds: DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            refresh_token_ttl_seconds: DEFAULT_REFRESH_TOKEN_TTL_SECONDS,
            lockout_max_attempts: DEFAULT_LOCKOUT_MAX_ATTEMPTS,
            lockout_window_seconds: DEFAULT_LOCKOUT_WINDOW_SECONDS,
            otp_ttl_seconds: DEFAULT_OTP_TTL_SECONDS,
            otp_max_attempts: DEFAULT_OTP_MAX_ATTEMPTS,
            otp_max_resends: DEFAULT_OTP_MAX_RESENDS,
            action_token_ttl_seconds: DEFAULT_ACTION_TOKEN_TTL_SECONDS,
            totp_issuer: DEFAULT_TOTP_ISSUER.to_string(),
        }
    }

    #[must_use]
    pub fn with_access_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_lockout_max_attempts(mut self, attempts: u32) -> Self {
        self.lockout_max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_lockout_window_seconds(mut self, seconds: u64) -> Self {
        self.lockout_window_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_otp_ttl_seconds(mut self, seconds: i64) -> Self {
        self.otp_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_otp_max_attempts(mut self, attempts: u32) -> Self {
        self.otp_max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_otp_max_resends(mut self, resends: u32) -> Self {
        self.otp_max_resends = resends;
        self
    }

    #[must_use]
    pub fn with_action_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.action_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_totp_issuer(mut self, issuer: String) -> Self {
        self.totp_issuer = issuer;
        self
    }

    #[must_use]
    pub fn access_token_secret(&self) -> &str {
        self.access_token_secret.expose_secret()
    }

    #[must_use]
    pub fn refresh_token_secret(&self) -> &str {
        self.refresh_token_secret.expose_secret()
    }

    #[must_use]
    pub fn codec_key(&self) -> &[u8; 32] {
        &self.codec_key
    }

    #[must_use]
    pub fn access_token_ttl_seconds(&self) -> i64 {
        self.access_token_ttl_seconds
    }

    #[must_use]
    pub fn refresh_token_ttl_seconds(&self) -> i64 {
        self.refresh_token_ttl_seconds
    }

    #[must_use]
    pub fn lockout_max_attempts(&self) -> u32 {
        self.lockout_max_attempts
    }

    #[must_use]
    pub fn lockout_window_seconds(&self) -> u64 {
        self.lockout_window_seconds
    }

    #[must_use]
    pub fn otp_ttl_seconds(&self) -> i64 {
        self.otp_ttl_seconds
    }

    #[must_use]
    pub fn otp_max_attempts(&self) -> u32 {
        self.otp_max_attempts
    }

    #[must_use]
    pub fn otp_max_resends(&self) -> u32 {
        self.otp_max_resends
    }

    #[must_use]
    pub fn action_token_ttl_seconds(&self) -> i64 {
        self.action_token_ttl_seconds
    }

    #[must_use]
    pub fn totp_issuer(&self) -> &str {
        &self.totp_issuer
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("access_token_secret", &"***")
            .field("refresh_token_secret", &"***")
            .field("codec_key", &"***")
            .field("access_token_ttl_seconds", &self.access_token_ttl_seconds)
            .field("refresh_token_ttl_seconds", &self.refresh_token_ttl_seconds)
            .field("lockout_max_attempts", &self.lockout_max_attempts)
            .field("lockout_window_seconds", &self.lockout_window_seconds)
            .field("otp_ttl_seconds", &self.otp_ttl_seconds)
            .field("otp_max_attempts", &self.otp_max_attempts)
            .field("otp_max_resends", &self.otp_max_resends)
            .field("action_token_ttl_seconds", &self.action_token_ttl_seconds)
            .field("totp_issuer", &self.totp_issuer)
            .finish()
    }
}
