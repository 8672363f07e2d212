//! Login endpoint.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use super::types::{LoginRequest, SessionResponse, TwoFactorChallengeResponse};
use super::utils::request_meta;
use super::Backend;
use crate::auth::error::AuthError;
use crate::auth::LoginOutcome;

/// Authenticate with an identifier and password, optionally carrying a
/// two-factor code. Accounts with a second factor answer 202 on the first
/// submission; the client repeats the call with `two_factor_code` set.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = SessionResponse),
        (status = 202, description = "Second factor required", body = TwoFactorChallengeResponse),
        (status = 401, description = "Invalid credentials or two-factor code"),
        (status = 423, description = "Account locked"),
        (status = 429, description = "Too many codes or verification attempts")
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    backend: Extension<Arc<Backend>>,
    Json(request): Json<LoginRequest>,
) -> Result<Response, AuthError> {
    let outcome = backend
        .login(
            &request.identifier,
            &request.password,
            request.two_factor_code.as_deref(),
            &request_meta(&headers),
        )
        .await?;

    Ok(match outcome {
        LoginOutcome::Authenticated(session) => {
            Json(SessionResponse::from(&session)).into_response()
        }
        LoginOutcome::TwoFactorRequired { method } => (
            StatusCode::ACCEPTED,
            Json(TwoFactorChallengeResponse {
                two_factor_required: true,
                method,
            }),
        )
            .into_response(),
    })
}
