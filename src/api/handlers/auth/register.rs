//! Registration endpoint.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use super::types::{RegisterRequest, SessionResponse};
use super::utils::{request_meta, valid_email, valid_password, valid_username};
use super::Backend;
use crate::auth::error::AuthError;

/// Create an account with the USER role and return its first token pair.
/// The address starts unverified; a verification email is enqueued.
#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = SessionResponse),
        (status = 400, description = "Invalid email, username, or password"),
        (status = 409, description = "Email or username already in use")
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    backend: Extension<Arc<Backend>>,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let email = request.email.trim().to_lowercase();
    let username = request.username.trim();
    if !valid_email(&email) {
        return Err(AuthError::Validation("invalid email address"));
    }
    if !valid_username(username) {
        return Err(AuthError::Validation(
            "username must be 3-32 lowercase letters, digits, '-' or '_'",
        ));
    }
    if !valid_password(&request.password) {
        return Err(AuthError::Validation(
            "password must be between 12 and 128 characters",
        ));
    }

    let session = backend
        .register(&email, username, &request.password, &request_meta(&headers))
        .await?;
    Ok((StatusCode::CREATED, Json(SessionResponse::from(&session))))
}
