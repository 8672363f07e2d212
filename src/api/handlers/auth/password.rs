//! Email verification and password reset endpoints.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use super::types::{ForgotPasswordRequest, ResetPasswordRequest, VerifyEmailRequest};
use super::utils::{request_meta, valid_password};
use super::Backend;
use crate::auth::error::AuthError;

/// Consume an emailed verification token and mark the address verified.
#[utoipa::path(
    post,
    path = "/v1/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 204, description = "Email verified"),
        (status = 400, description = "Invalid, expired, or already-used token")
    ),
    tag = "auth"
)]
pub async fn verify_email(
    headers: HeaderMap,
    backend: Extension<Arc<Backend>>,
    Json(request): Json<VerifyEmailRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let token = request.token.trim();
    if token.is_empty() {
        return Err(AuthError::Validation("missing token"));
    }
    backend.verify_email(token, &request_meta(&headers)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Start a password reset. Answers 204 whether or not the email matches an
/// account so the endpoint cannot be used for enumeration.
#[utoipa::path(
    post,
    path = "/v1/auth/password/forgot",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 204, description = "Reset email sent if the account exists")
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    backend: Extension<Arc<Backend>>,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AuthError> {
    backend.forgot_password(&request.email).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Complete a password reset with an emailed token. Every session for the
/// account is revoked.
#[utoipa::path(
    post,
    path = "/v1/auth/password/reset",
    request_body = ResetPasswordRequest,
    responses(
        (status = 204, description = "Password updated, sessions revoked"),
        (status = 400, description = "Invalid token or password")
    ),
    tag = "auth"
)]
pub async fn reset_password(
    headers: HeaderMap,
    backend: Extension<Arc<Backend>>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AuthError> {
    if !valid_password(&request.new_password) {
        return Err(AuthError::Validation(
            "password must be between 12 and 128 characters",
        ));
    }
    backend
        .reset_password(
            request.token.trim(),
            &request.new_password,
            &request_meta(&headers),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
