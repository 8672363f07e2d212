//! Two-factor enrollment and management endpoints. All require a valid
//! access token.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use super::principal::require_principal;
use super::types::{
    DisableTwoFactorRequest, SendEmailCodeRequest, TotpConfirmRequest, TotpConfirmResponse,
    TotpSetupResponse,
};
use super::utils::request_meta;
use super::Backend;
use crate::auth::error::AuthError;

/// Begin TOTP enrollment: returns the base32 secret and otpauth URI for the
/// authenticator app. The factor stays disabled until confirmed.
#[utoipa::path(
    post,
    path = "/v1/auth/2fa/totp/setup",
    responses(
        (status = 200, description = "Provisioning secret issued", body = TotpSetupResponse),
        (status = 401, description = "Missing or invalid access token")
    ),
    security(("bearer" = [])),
    tag = "2fa"
)]
pub async fn totp_setup(
    headers: HeaderMap,
    backend: Extension<Arc<Backend>>,
) -> Result<impl IntoResponse, AuthError> {
    let claims = require_principal(&headers, &backend)?;
    let provisioned = backend
        .totp_setup(claims.identity_id()?, &request_meta(&headers))
        .await?;
    Ok(Json(TotpSetupResponse {
        secret: provisioned.secret_base32,
        otpauth_url: provisioned.otpauth_url,
    }))
}

/// Confirm TOTP enrollment with a current code. Enables the factor and
/// returns the recovery codes, shown exactly once.
#[utoipa::path(
    post,
    path = "/v1/auth/2fa/totp/confirm",
    request_body = TotpConfirmRequest,
    responses(
        (status = 200, description = "Factor enabled", body = TotpConfirmResponse),
        (status = 400, description = "Wrong code"),
        (status = 401, description = "Missing or invalid access token"),
        (status = 404, description = "No pending enrollment")
    ),
    security(("bearer" = [])),
    tag = "2fa"
)]
pub async fn totp_confirm(
    headers: HeaderMap,
    backend: Extension<Arc<Backend>>,
    Json(request): Json<TotpConfirmRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let claims = require_principal(&headers, &backend)?;
    let recovery_codes = backend
        .totp_confirm(
            claims.identity_id()?,
            request.code.trim(),
            &request_meta(&headers),
        )
        .await?;
    Ok(Json(TotpConfirmResponse { recovery_codes }))
}

/// Enable the emailed one-time-code factor for the caller.
#[utoipa::path(
    post,
    path = "/v1/auth/2fa/email/enable",
    responses(
        (status = 204, description = "Factor enabled"),
        (status = 401, description = "Missing or invalid access token")
    ),
    security(("bearer" = [])),
    tag = "2fa"
)]
pub async fn email_enable(
    headers: HeaderMap,
    backend: Extension<Arc<Backend>>,
) -> Result<impl IntoResponse, AuthError> {
    let claims = require_principal(&headers, &backend)?;
    backend
        .enable_email_2fa(claims.identity_id()?, &request_meta(&headers))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Re-send the emailed login code during a pending challenge. Answers 204
/// whether the identifier is unknown, lacks the factor, or has no login in
/// flight, so accounts cannot be probed.
#[utoipa::path(
    post,
    path = "/v1/auth/2fa/email/send",
    request_body = SendEmailCodeRequest,
    responses(
        (status = 204, description = "Code sent if applicable"),
        (status = 429, description = "Resend quota exhausted")
    ),
    tag = "2fa"
)]
pub async fn email_send(
    backend: Extension<Arc<Backend>>,
    Json(request): Json<SendEmailCodeRequest>,
) -> Result<impl IntoResponse, AuthError> {
    backend.resend_login_otp(&request.identifier).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Disable a second factor. Requires the account password as step-up.
#[utoipa::path(
    post,
    path = "/v1/auth/2fa/disable",
    request_body = DisableTwoFactorRequest,
    responses(
        (status = 204, description = "Factor disabled"),
        (status = 401, description = "Missing token or wrong password")
    ),
    security(("bearer" = [])),
    tag = "2fa"
)]
pub async fn disable(
    headers: HeaderMap,
    backend: Extension<Arc<Backend>>,
    Json(request): Json<DisableTwoFactorRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let claims = require_principal(&headers, &backend)?;
    backend
        .disable_2fa(
            claims.identity_id()?,
            request.kind,
            &request.password,
            &request_meta(&headers),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
