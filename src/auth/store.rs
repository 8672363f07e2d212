//! Adapter traits and entity records for the external collaborators:
//! the relational store, the counter cache, and the outbound notifier.
//!
//! The engines and the orchestrator are generic over these traits so the
//! same policies run against Postgres/Redis in production and against
//! in-memory fakes in tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::AuthError;

/// Role attached to an identity. Stored as text, compared by variant.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Owner,
    Admin,
    User,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "OWNER",
            Self::Admin => "ADMIN",
            Self::User => "USER",
        }
    }

    #[must_use]
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim() {
            "OWNER" => Some(Self::Owner),
            "ADMIN" => Some(Self::Admin),
            "USER" => Some(Self::User),
            _ => None,
        }
    }

    /// Roles allowed to use the administrative unlock endpoint.
    #[must_use]
    pub fn is_admin(self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }
}

#[derive(Clone, Debug)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub role: Role,
    pub email_verified_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug)]
pub struct Credential {
    pub identity_id: Uuid,
    pub password_hash: String,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// A persisted refresh-token record. Only the token hash is stored.
#[derive(Clone, Debug)]
pub struct SessionRecord {
    pub id: Uuid,
    pub identity_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Second-factor type. One record per (identity, kind) pair.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FactorKind {
    Totp,
    Email,
}

impl FactorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Totp => "TOTP",
            Self::Email => "EMAIL",
        }
    }

    #[must_use]
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim() {
            "TOTP" => Some(Self::Totp),
            "EMAIL" => Some(Self::Email),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SecondFactor {
    pub identity_id: Uuid,
    pub kind: FactorKind,
    /// Encrypted shared secret; a placeholder for the EMAIL kind.
    pub secret: Vec<u8>,
    pub enabled: bool,
}

#[derive(Clone, Debug)]
pub struct OtpChallenge {
    pub identity_id: Uuid,
    pub code_hash: String,
    pub attempts: i32,
    pub expires_at: DateTime<Utc>,
}

/// Append-only record of a login attempt as submitted.
#[derive(Clone, Debug)]
pub struct LoginAttempt {
    pub identifier: String,
    pub origin: Option<String>,
    pub success: bool,
}

/// Append-only structured security event.
#[derive(Clone, Debug)]
pub struct AuditEvent {
    pub identity_id: Uuid,
    pub action: String,
    pub method: Option<String>,
    pub success: bool,
    pub origin: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: serde_json::Value,
}

#[derive(Clone, Debug)]
pub struct NewIdentity {
    pub email: String,
    pub username: String,
    pub password_hash: String,
}

/// Purpose tag for single-use emailed tokens.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TokenPurpose {
    VerifyEmail,
    ResetPassword,
}

impl TokenPurpose {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VerifyEmail => "verify_email",
            Self::ResetPassword => "reset_password",
        }
    }
}

/// Relational store operations. At-least read-committed isolation assumed;
/// email/username uniqueness is enforced by the store and surfaced as
/// [`AuthError::Conflict`].
#[allow(async_fn_in_trait)]
pub trait CredentialStore: Send + Sync {
    /// Match the submitted identifier against email or username.
    async fn find_identity_by_login(&self, identifier: &str) -> Result<Option<Identity>, AuthError>;
    async fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>, AuthError>;
    async fn find_identity_by_id(&self, identity_id: Uuid) -> Result<Option<Identity>, AuthError>;
    /// Create identity and credential in one atomic operation.
    async fn create_identity(&self, new: &NewIdentity) -> Result<Identity, AuthError>;

    async fn get_credential(&self, identity_id: Uuid) -> Result<Option<Credential>, AuthError>;
    async fn update_password_hash(&self, identity_id: Uuid, hash: &str) -> Result<(), AuthError>;
    async fn touch_last_login(&self, identity_id: Uuid) -> Result<(), AuthError>;
    async fn mark_email_verified(&self, identity_id: Uuid) -> Result<(), AuthError>;

    async fn create_session(
        &self,
        identity_id: Uuid,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError>;
    /// Only live (unexpired) sessions are returned.
    async fn find_session_by_hash(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<SessionRecord>, AuthError>;
    async fn delete_session_by_hash(&self, token_hash: &[u8]) -> Result<bool, AuthError>;
    async fn delete_sessions_for(&self, identity_id: Uuid) -> Result<u64, AuthError>;

    /// Insert or overwrite the (identity, kind) factor row.
    async fn upsert_second_factor(
        &self,
        identity_id: Uuid,
        kind: FactorKind,
        secret: &[u8],
        enabled: bool,
    ) -> Result<(), AuthError>;
    async fn find_second_factor(
        &self,
        identity_id: Uuid,
        kind: FactorKind,
    ) -> Result<Option<SecondFactor>, AuthError>;
    async fn enabled_second_factors(
        &self,
        identity_id: Uuid,
    ) -> Result<Vec<SecondFactor>, AuthError>;
    async fn set_second_factor_enabled(
        &self,
        identity_id: Uuid,
        kind: FactorKind,
        enabled: bool,
    ) -> Result<(), AuthError>;

    /// Replace the stored recovery-code hash set, preserving order.
    async fn replace_recovery_hashes(
        &self,
        identity_id: Uuid,
        hashes: &[String],
    ) -> Result<(), AuthError>;
    async fn list_recovery_hashes(&self, identity_id: Uuid) -> Result<Vec<String>, AuthError>;
    /// Remove one hash; returns false if it was already gone.
    async fn remove_recovery_hash(
        &self,
        identity_id: Uuid,
        hash: &str,
    ) -> Result<bool, AuthError>;

    async fn delete_otp_challenges(&self, identity_id: Uuid) -> Result<(), AuthError>;
    async fn create_otp_challenge(
        &self,
        identity_id: Uuid,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError>;
    /// An expired challenge is treated as absent even if not yet deleted.
    async fn find_live_otp_challenge(
        &self,
        identity_id: Uuid,
    ) -> Result<Option<OtpChallenge>, AuthError>;
    async fn bump_otp_challenge_attempts(&self, identity_id: Uuid) -> Result<(), AuthError>;

    async fn append_login_attempt(&self, attempt: &LoginAttempt) -> Result<(), AuthError>;
    async fn append_audit_event(&self, event: &AuditEvent) -> Result<(), AuthError>;

    async fn create_action_token(
        &self,
        identity_id: Uuid,
        purpose: TokenPurpose,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError>;
    /// Consume a live token, returning the owning identity id.
    async fn consume_action_token(
        &self,
        purpose: TokenPurpose,
        token_hash: &[u8],
    ) -> Result<Option<Uuid>, AuthError>;
}

/// Key-value cache with per-key expiry for counters and lock flags.
/// Losing cache state resets lockouts; accepted degraded behavior.
#[allow(async_fn_in_trait)]
pub trait CounterCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AuthError>;
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), AuthError>;
    async fn del(&self, key: &str) -> Result<(), AuthError>;
    /// Remaining TTL in seconds, `None` when the key is absent or persistent.
    async fn ttl(&self, key: &str) -> Result<Option<i64>, AuthError>;
}

/// Templated message dispatch. Callers decide whether a send failure is
/// fatal (OTP challenge delivery) or merely logged (lockout notices).
#[allow(async_fn_in_trait)]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        to: &str,
        template: &str,
        context: &serde_json::Value,
    ) -> Result<(), AuthError>;
}
