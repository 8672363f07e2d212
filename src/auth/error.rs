//! Domain error taxonomy for the authentication flows.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Terminal outcomes for an authentication request.
///
/// Lockout and rate-limit variants are expected security outcomes, not system
/// failures; only `Internal` carries an error chain worth logging.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("{0}")]
    Validation(&'static str),
    #[error("{0} already in use")]
    Conflict(&'static str),
    #[error("account locked, try again in {minutes} minutes")]
    AccountLocked { minutes: i64 },
    #[error("too many codes requested")]
    RateLimited,
    #[error("too many verification attempts")]
    TooManyAttempts,
    #[error("invalid code")]
    InvalidCode,
    #[error("invalid two-factor code")]
    InvalidTwoFactorCode,
    #[error("invalid refresh token")]
    InvalidRefreshToken,
    #[error("malformed or tampered ciphertext")]
    Decode,
    #[error("not found")]
    NotFound,
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::Validation(_) => "VALIDATION",
            Self::Conflict(_) => "CONFLICT",
            Self::AccountLocked { .. } => "ACCOUNT_LOCKED",
            Self::RateLimited => "RATE_LIMITED",
            Self::TooManyAttempts => "TOO_MANY_ATTEMPTS",
            Self::InvalidCode => "INVALID_CODE",
            Self::InvalidTwoFactorCode => "INVALID_TWO_FACTOR_CODE",
            Self::InvalidRefreshToken => "INVALID_REFRESH_TOKEN",
            Self::Decode => "DECODE_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::InvalidCredentials | Self::InvalidTwoFactorCode | Self::InvalidRefreshToken => {
                StatusCode::UNAUTHORIZED
            }
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::AccountLocked { .. } => StatusCode::LOCKED,
            Self::RateLimited | Self::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
            Self::InvalidCode | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Decode | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // Log 500s only — tower-http's TraceLayer already records method/uri/status
        // for every request, and 4xx/423/429 are expected security outcomes.
        if let Self::Internal(ref err) = self {
            tracing::error!(error = %err, kind = "INTERNAL", "internal error");
        }
        let body = serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}
