//! Signed token pair issuance and validation.
//!
//! Two HS256 tokens per successful authentication: a short-lived access
//! token and a long-lived refresh token, signed with distinct secrets.
//! Only the refresh token is persisted (hashed) as a session row.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use super::error::AuthError;
use super::store::{Identity, Role};

/// Claims carried by both tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub username: String,
    pub role: Role,
    pub exp: u64,
}

impl Claims {
    /// Parse the subject back into an identity id.
    ///
    /// # Errors
    /// Returns `InvalidRefreshToken` when the subject is not a UUID.
    pub fn identity_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.sub).map_err(|_| AuthError::InvalidRefreshToken)
    }
}

#[derive(Clone, Debug)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds at which the access token expires.
    pub access_expires_at: u64,
}

#[derive(Clone)]
pub struct TokenSigner {
    access_secret: String,
    refresh_secret: String,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

impl TokenSigner {
    #[must_use]
    pub fn new(
        access_secret: &str,
        refresh_secret: &str,
        access_ttl_seconds: i64,
        refresh_ttl_seconds: i64,
    ) -> Self {
        Self {
            access_secret: access_secret.to_string(),
            refresh_secret: refresh_secret.to_string(),
            access_ttl_seconds,
            refresh_ttl_seconds,
        }
    }

    /// Issue a fresh access/refresh pair for an identity.
    ///
    /// # Errors
    /// Returns `Internal` if encoding fails.
    pub fn issue_pair(&self, identity: &Identity) -> Result<TokenPair, AuthError> {
        let access_exp = now_secs().saturating_add(self.access_ttl_seconds.unsigned_abs());
        let refresh_exp = now_secs().saturating_add(self.refresh_ttl_seconds.unsigned_abs());

        let access_token = sign(&self.access_secret, identity, access_exp)?;
        let refresh_token = sign(&self.refresh_secret, identity, refresh_exp)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_expires_at: access_exp,
        })
    }

    /// Validate an access token's signature and expiry.
    ///
    /// # Errors
    /// Returns `InvalidCredentials` on any validation failure; access tokens
    /// are trusted purely by signature and expiry.
    pub fn validate_access(&self, token: &str) -> Result<Claims, AuthError> {
        validate(&self.access_secret, token).map_err(|_| AuthError::InvalidCredentials)
    }

    /// Validate a refresh token's signature and embedded expiry.
    ///
    /// # Errors
    /// Returns `InvalidRefreshToken` on any validation failure.
    pub fn validate_refresh(&self, token: &str) -> Result<Claims, AuthError> {
        validate(&self.refresh_secret, token).map_err(|_| AuthError::InvalidRefreshToken)
    }

    #[must_use]
    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_seconds
    }
}

fn sign(secret: &str, identity: &Identity, exp: u64) -> Result<String, AuthError> {
    let claims = Claims {
        sub: identity.id.to_string(),
        email: identity.email.clone(),
        username: identity.username.clone(),
        role: identity.role,
        exp,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|err| AuthError::Internal(err.into()))
}

fn validate(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
    validation.set_required_spec_claims(&["exp", "sub"]);
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

/// Hash a refresh token for session storage; raw tokens never touch the store.
#[must_use]
pub fn hash_refresh_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}
