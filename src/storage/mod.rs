//! Postgres-backed [`CredentialStore`].
//!
//! All statements run through runtime-checked queries inside `db.query`
//! spans. Uniqueness for emails and usernames is enforced by the schema
//! and mapped onto [`AuthError::Conflict`] by constraint name.

use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use crate::auth::error::AuthError;
use crate::auth::store::{
    AuditEvent, Credential, CredentialStore, FactorKind, Identity, LoginAttempt, NewIdentity,
    OtpChallenge, Role, SecondFactor, SessionRecord, TokenPurpose,
};

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn query_span(operation: &str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// Which column a 23505 on `identities` refers to, by constraint name.
fn conflict_field(err: &sqlx::Error) -> &'static str {
    if let sqlx::Error::Database(db_err) = err {
        if db_err
            .constraint()
            .is_some_and(|name| name.contains("username"))
        {
            return "username";
        }
    }
    "email"
}

fn identity_from_row(row: &sqlx::postgres::PgRow) -> Result<Identity, AuthError> {
    let role: String = row.get("role");
    let role = Role::from_str(&role)
        .ok_or_else(|| AuthError::Internal(anyhow::anyhow!("unknown role in store: {role}")))?;
    Ok(Identity {
        id: row.get("id"),
        email: row.get("email"),
        username: row.get("username"),
        role,
        email_verified_at: row.get("email_verified_at"),
    })
}

fn factor_from_row(row: &sqlx::postgres::PgRow) -> Result<SecondFactor, AuthError> {
    let kind: String = row.get("kind");
    let kind = FactorKind::from_str(&kind)
        .ok_or_else(|| AuthError::Internal(anyhow::anyhow!("unknown factor kind: {kind}")))?;
    Ok(SecondFactor {
        identity_id: row.get("identity_id"),
        kind,
        secret: row.get("secret"),
        enabled: row.get("enabled"),
    })
}

impl CredentialStore for PgCredentialStore {
    async fn find_identity_by_login(
        &self,
        identifier: &str,
    ) -> Result<Option<Identity>, AuthError> {
        let query = "SELECT id, email, username, role, email_verified_at \
                     FROM identities WHERE email = $1 OR username = $1";
        let row = sqlx::query(query)
            .bind(identifier)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to look up identity by identifier")
            .map_err(AuthError::Internal)?;
        row.as_ref().map(identity_from_row).transpose()
    }

    async fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>, AuthError> {
        let query = "SELECT id, email, username, role, email_verified_at \
                     FROM identities WHERE email = $1";
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to look up identity by email")
            .map_err(AuthError::Internal)?;
        row.as_ref().map(identity_from_row).transpose()
    }

    async fn find_identity_by_id(&self, identity_id: Uuid) -> Result<Option<Identity>, AuthError> {
        let query = "SELECT id, email, username, role, email_verified_at \
                     FROM identities WHERE id = $1";
        let row = sqlx::query(query)
            .bind(identity_id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to look up identity by id")
            .map_err(AuthError::Internal)?;
        row.as_ref().map(identity_from_row).transpose()
    }

    async fn create_identity(&self, new: &NewIdentity) -> Result<Identity, AuthError> {
        // Identity and credential rows stay consistent under one transaction.
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin signup transaction")
            .map_err(AuthError::Internal)?;

        let query = "INSERT INTO identities (email, username) VALUES ($1, $2) \
                     RETURNING id, email, username, role, email_verified_at";
        let row = sqlx::query(query)
            .bind(&new.email)
            .bind(&new.username)
            .fetch_one(&mut *tx)
            .instrument(query_span("INSERT", query))
            .await;
        let row = match row {
            Ok(row) => row,
            Err(err) if is_unique_violation(&err) => {
                let _ = tx.rollback().await;
                return Err(AuthError::Conflict(conflict_field(&err)));
            }
            Err(err) => {
                return Err(AuthError::Internal(
                    anyhow::Error::from(err).context("failed to insert identity"),
                ))
            }
        };
        let identity = identity_from_row(&row)?;

        let query = "INSERT INTO credentials (identity_id, password_hash) VALUES ($1, $2)";
        sqlx::query(query)
            .bind(identity.id)
            .bind(&new.password_hash)
            .execute(&mut *tx)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to insert credential")
            .map_err(AuthError::Internal)?;

        tx.commit()
            .await
            .context("failed to commit signup transaction")
            .map_err(AuthError::Internal)?;
        Ok(identity)
    }

    async fn get_credential(&self, identity_id: Uuid) -> Result<Option<Credential>, AuthError> {
        let query = "SELECT identity_id, password_hash, last_login_at \
                     FROM credentials WHERE identity_id = $1";
        let row = sqlx::query(query)
            .bind(identity_id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to look up credential")
            .map_err(AuthError::Internal)?;
        Ok(row.map(|row| Credential {
            identity_id: row.get("identity_id"),
            password_hash: row.get("password_hash"),
            last_login_at: row.get("last_login_at"),
        }))
    }

    async fn update_password_hash(&self, identity_id: Uuid, hash: &str) -> Result<(), AuthError> {
        let query = "UPDATE credentials SET password_hash = $2, updated_at = now() \
                     WHERE identity_id = $1";
        sqlx::query(query)
            .bind(identity_id)
            .bind(hash)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to update password hash")
            .map_err(AuthError::Internal)?;
        Ok(())
    }

    async fn touch_last_login(&self, identity_id: Uuid) -> Result<(), AuthError> {
        let query = "UPDATE credentials SET last_login_at = now() WHERE identity_id = $1";
        sqlx::query(query)
            .bind(identity_id)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to touch last login")
            .map_err(AuthError::Internal)?;
        Ok(())
    }

    async fn mark_email_verified(&self, identity_id: Uuid) -> Result<(), AuthError> {
        let query = "UPDATE identities SET email_verified_at = now() \
                     WHERE id = $1 AND email_verified_at IS NULL";
        sqlx::query(query)
            .bind(identity_id)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to mark email verified")
            .map_err(AuthError::Internal)?;
        Ok(())
    }

    async fn create_session(
        &self,
        identity_id: Uuid,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let query = "INSERT INTO sessions (identity_id, token_hash, expires_at) \
                     VALUES ($1, $2, $3)";
        sqlx::query(query)
            .bind(identity_id)
            .bind(token_hash)
            .bind(expires_at)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to insert session")
            .map_err(AuthError::Internal)?;
        Ok(())
    }

    async fn find_session_by_hash(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<SessionRecord>, AuthError> {
        let query = "SELECT id, identity_id, expires_at FROM sessions \
                     WHERE token_hash = $1 AND expires_at > now()";
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to look up session")
            .map_err(AuthError::Internal)?;
        Ok(row.map(|row| SessionRecord {
            id: row.get("id"),
            identity_id: row.get("identity_id"),
            expires_at: row.get("expires_at"),
        }))
    }

    async fn delete_session_by_hash(&self, token_hash: &[u8]) -> Result<bool, AuthError> {
        let query = "DELETE FROM sessions WHERE token_hash = $1";
        let result = sqlx::query(query)
            .bind(token_hash)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to delete session")
            .map_err(AuthError::Internal)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_sessions_for(&self, identity_id: Uuid) -> Result<u64, AuthError> {
        let query = "DELETE FROM sessions WHERE identity_id = $1";
        let result = sqlx::query(query)
            .bind(identity_id)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to delete sessions")
            .map_err(AuthError::Internal)?;
        Ok(result.rows_affected())
    }

    async fn upsert_second_factor(
        &self,
        identity_id: Uuid,
        kind: FactorKind,
        secret: &[u8],
        enabled: bool,
    ) -> Result<(), AuthError> {
        let query = "INSERT INTO second_factors (identity_id, kind, secret, enabled) \
                     VALUES ($1, $2, $3, $4) \
                     ON CONFLICT (identity_id, kind) \
                     DO UPDATE SET secret = EXCLUDED.secret, enabled = EXCLUDED.enabled";
        sqlx::query(query)
            .bind(identity_id)
            .bind(kind.as_str())
            .bind(secret)
            .bind(enabled)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to upsert second factor")
            .map_err(AuthError::Internal)?;
        Ok(())
    }

    async fn find_second_factor(
        &self,
        identity_id: Uuid,
        kind: FactorKind,
    ) -> Result<Option<SecondFactor>, AuthError> {
        let query = "SELECT identity_id, kind, secret, enabled FROM second_factors \
                     WHERE identity_id = $1 AND kind = $2";
        let row = sqlx::query(query)
            .bind(identity_id)
            .bind(kind.as_str())
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to look up second factor")
            .map_err(AuthError::Internal)?;
        row.as_ref().map(factor_from_row).transpose()
    }

    async fn enabled_second_factors(
        &self,
        identity_id: Uuid,
    ) -> Result<Vec<SecondFactor>, AuthError> {
        let query = "SELECT identity_id, kind, secret, enabled FROM second_factors \
                     WHERE identity_id = $1 AND enabled";
        let rows = sqlx::query(query)
            .bind(identity_id)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to list second factors")
            .map_err(AuthError::Internal)?;
        rows.iter().map(factor_from_row).collect()
    }

    async fn set_second_factor_enabled(
        &self,
        identity_id: Uuid,
        kind: FactorKind,
        enabled: bool,
    ) -> Result<(), AuthError> {
        let query = "UPDATE second_factors SET enabled = $3 \
                     WHERE identity_id = $1 AND kind = $2";
        sqlx::query(query)
            .bind(identity_id)
            .bind(kind.as_str())
            .bind(enabled)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to toggle second factor")
            .map_err(AuthError::Internal)?;
        Ok(())
    }

    async fn replace_recovery_hashes(
        &self,
        identity_id: Uuid,
        hashes: &[String],
    ) -> Result<(), AuthError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin recovery transaction")
            .map_err(AuthError::Internal)?;

        let query = "DELETE FROM recovery_codes WHERE identity_id = $1";
        sqlx::query(query)
            .bind(identity_id)
            .execute(&mut *tx)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to clear recovery codes")
            .map_err(AuthError::Internal)?;

        let query = "INSERT INTO recovery_codes (identity_id, position, code_hash) \
                     VALUES ($1, $2, $3)";
        for (position, hash) in hashes.iter().enumerate() {
            sqlx::query(query)
                .bind(identity_id)
                .bind(position as i32)
                .bind(hash)
                .execute(&mut *tx)
                .instrument(query_span("INSERT", query))
                .await
                .context("failed to insert recovery code")
                .map_err(AuthError::Internal)?;
        }

        tx.commit()
            .await
            .context("failed to commit recovery transaction")
            .map_err(AuthError::Internal)?;
        Ok(())
    }

    async fn list_recovery_hashes(&self, identity_id: Uuid) -> Result<Vec<String>, AuthError> {
        let query = "SELECT code_hash FROM recovery_codes \
                     WHERE identity_id = $1 ORDER BY position";
        let rows = sqlx::query(query)
            .bind(identity_id)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to list recovery codes")
            .map_err(AuthError::Internal)?;
        Ok(rows.iter().map(|row| row.get("code_hash")).collect())
    }

    async fn remove_recovery_hash(
        &self,
        identity_id: Uuid,
        hash: &str,
    ) -> Result<bool, AuthError> {
        let query = "DELETE FROM recovery_codes WHERE identity_id = $1 AND code_hash = $2";
        let result = sqlx::query(query)
            .bind(identity_id)
            .bind(hash)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to remove recovery code")
            .map_err(AuthError::Internal)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_otp_challenges(&self, identity_id: Uuid) -> Result<(), AuthError> {
        let query = "DELETE FROM otp_challenges WHERE identity_id = $1";
        sqlx::query(query)
            .bind(identity_id)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to delete challenges")
            .map_err(AuthError::Internal)?;
        Ok(())
    }

    async fn create_otp_challenge(
        &self,
        identity_id: Uuid,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        // One live challenge per identity; a new code supersedes the old.
        let query = "INSERT INTO otp_challenges (identity_id, code_hash, expires_at) \
                     VALUES ($1, $2, $3) \
                     ON CONFLICT (identity_id) \
                     DO UPDATE SET code_hash = EXCLUDED.code_hash, attempts = 0, \
                                   expires_at = EXCLUDED.expires_at";
        sqlx::query(query)
            .bind(identity_id)
            .bind(code_hash)
            .bind(expires_at)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to create challenge")
            .map_err(AuthError::Internal)?;
        Ok(())
    }

    async fn find_live_otp_challenge(
        &self,
        identity_id: Uuid,
    ) -> Result<Option<OtpChallenge>, AuthError> {
        let query = "SELECT identity_id, code_hash, attempts, expires_at FROM otp_challenges \
                     WHERE identity_id = $1 AND expires_at > now()";
        let row = sqlx::query(query)
            .bind(identity_id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to look up challenge")
            .map_err(AuthError::Internal)?;
        Ok(row.map(|row| OtpChallenge {
            identity_id: row.get("identity_id"),
            code_hash: row.get("code_hash"),
            attempts: row.get("attempts"),
            expires_at: row.get("expires_at"),
        }))
    }

    async fn bump_otp_challenge_attempts(&self, identity_id: Uuid) -> Result<(), AuthError> {
        let query = "UPDATE otp_challenges SET attempts = attempts + 1 WHERE identity_id = $1";
        sqlx::query(query)
            .bind(identity_id)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to bump challenge attempts")
            .map_err(AuthError::Internal)?;
        Ok(())
    }

    async fn append_login_attempt(&self, attempt: &LoginAttempt) -> Result<(), AuthError> {
        let query = "INSERT INTO login_attempts (identifier, origin, success) \
                     VALUES ($1, $2, $3)";
        sqlx::query(query)
            .bind(&attempt.identifier)
            .bind(&attempt.origin)
            .bind(attempt.success)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to append login attempt")
            .map_err(AuthError::Internal)?;
        Ok(())
    }

    async fn append_audit_event(&self, event: &AuditEvent) -> Result<(), AuthError> {
        let query = "INSERT INTO audit_events \
                     (identity_id, action, method, success, origin, user_agent, metadata) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7)";
        sqlx::query(query)
            .bind(event.identity_id)
            .bind(&event.action)
            .bind(&event.method)
            .bind(event.success)
            .bind(&event.origin)
            .bind(&event.user_agent)
            .bind(&event.metadata)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to append audit event")
            .map_err(AuthError::Internal)?;
        Ok(())
    }

    async fn create_action_token(
        &self,
        identity_id: Uuid,
        purpose: TokenPurpose,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let query = "INSERT INTO action_tokens (identity_id, purpose, token_hash, expires_at) \
                     VALUES ($1, $2, $3, $4)";
        sqlx::query(query)
            .bind(identity_id)
            .bind(purpose.as_str())
            .bind(token_hash)
            .bind(expires_at)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to insert action token")
            .map_err(AuthError::Internal)?;
        Ok(())
    }

    async fn consume_action_token(
        &self,
        purpose: TokenPurpose,
        token_hash: &[u8],
    ) -> Result<Option<Uuid>, AuthError> {
        // Single-use: marking used and reading the owner is one statement.
        let query = "UPDATE action_tokens SET used_at = now() \
                     WHERE purpose = $1 AND token_hash = $2 \
                       AND expires_at > now() AND used_at IS NULL \
                     RETURNING identity_id";
        let row = sqlx::query(query)
            .bind(purpose.as_str())
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to consume action token")
            .map_err(AuthError::Internal)?;
        Ok(row.map(|row| row.get("identity_id")))
    }
}
