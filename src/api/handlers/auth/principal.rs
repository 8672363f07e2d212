//! Bearer-token principal extraction for protected endpoints.

use axum::http::{header::AUTHORIZATION, HeaderMap};

use super::Backend;
use crate::auth::error::AuthError;
use crate::auth::tokens::Claims;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Validate the Authorization header and return its claims.
///
/// # Errors
/// `InvalidCredentials` when the header is missing, malformed, or the token
/// fails validation.
pub(super) fn require_principal(headers: &HeaderMap, backend: &Backend) -> Result<Claims, AuthError> {
    let token = bearer_token(headers).ok_or(AuthError::InvalidCredentials)?;
    backend.verify_access_token(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);

        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
