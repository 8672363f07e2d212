//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::store::{FactorKind, Identity, Role};
use crate::auth::AuthenticatedSession;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    /// Email or username.
    pub identifier: String,
    pub password: String,
    pub two_factor_code: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct IdentityResponse {
    pub id: String,
    pub email: String,
    pub username: String,
    pub role: Role,
    pub email_verified_at: Option<String>,
}

impl From<&Identity> for IdentityResponse {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id.to_string(),
            email: identity.email.clone(),
            username: identity.username.clone(),
            role: identity.role,
            email_verified_at: identity
                .email_verified_at
                .map(|verified_at| verified_at.to_rfc3339()),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds at which the access token expires.
    pub access_expires_at: u64,
    pub identity: IdentityResponse,
}

impl From<&AuthenticatedSession> for SessionResponse {
    fn from(session: &AuthenticatedSession) -> Self {
        Self {
            access_token: session.tokens.access_token.clone(),
            refresh_token: session.tokens.refresh_token.clone(),
            access_expires_at: session.tokens.access_expires_at,
            identity: IdentityResponse::from(&session.identity),
        }
    }
}

/// Returned with 202 when the password matched but a code is still needed.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TwoFactorChallengeResponse {
    pub two_factor_required: bool,
    pub method: FactorKind,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LogoutRequest {
    pub refresh_token: String,
    /// Revoke every session for the identity, not just this one.
    #[serde(default)]
    pub everywhere: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TotpSetupResponse {
    pub secret: String,
    pub otpauth_url: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TotpConfirmRequest {
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TotpConfirmResponse {
    /// Shown exactly once; only hashes are retained server-side.
    pub recovery_codes: Vec<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct DisableTwoFactorRequest {
    pub kind: FactorKind,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SendEmailCodeRequest {
    pub identifier: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UnlockRequest {
    pub identifier: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    #[must_use]
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}
