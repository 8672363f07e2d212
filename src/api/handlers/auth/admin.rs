//! Administrative endpoints.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use super::principal::require_principal;
use super::types::UnlockRequest;
use super::utils::request_meta;
use super::Backend;
use crate::auth::error::AuthError;

/// Clear an account lockout before its window expires. Restricted to the
/// ADMIN and OWNER roles.
#[utoipa::path(
    post,
    path = "/v1/auth/admin/unlock",
    request_body = UnlockRequest,
    responses(
        (status = 204, description = "Lock cleared"),
        (status = 401, description = "Missing or invalid access token"),
        (status = 404, description = "Caller is not an administrator")
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
pub async fn unlock(
    headers: HeaderMap,
    backend: Extension<Arc<Backend>>,
    Json(request): Json<UnlockRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let claims = require_principal(&headers, &backend)?;
    // Non-admins get the same 404 as a missing route.
    if !claims.role.is_admin() {
        return Err(AuthError::NotFound);
    }
    backend
        .unlock_account(
            &request.identifier,
            claims.identity_id()?,
            &request_meta(&headers),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
