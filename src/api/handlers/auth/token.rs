//! Refresh-token rotation and logout endpoints.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;

use super::types::{LogoutRequest, RefreshRequest, SessionResponse};
use super::Backend;
use crate::auth::error::AuthError;

/// Exchange a refresh token for a fresh pair. The presented token's session
/// is revoked; replaying it answers 401.
#[utoipa::path(
    post,
    path = "/v1/auth/token/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair issued", body = SessionResponse),
        (status = 401, description = "Invalid, expired, or replayed refresh token")
    ),
    tag = "auth"
)]
pub async fn refresh(
    backend: Extension<Arc<Backend>>,
    Json(request): Json<RefreshRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let session = backend.refresh(&request.refresh_token).await?;
    Ok(Json(SessionResponse::from(&session)))
}

/// Revoke the presented refresh token's session, or every session for the
/// identity when `everywhere` is set.
#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 204, description = "Session(s) revoked"),
        (status = 401, description = "Invalid refresh token")
    ),
    tag = "auth"
)]
pub async fn logout(
    backend: Extension<Arc<Backend>>,
    Json(request): Json<LogoutRequest>,
) -> Result<impl IntoResponse, AuthError> {
    backend
        .logout(&request.refresh_token, request.everywhere)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
