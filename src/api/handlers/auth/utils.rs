//! Small helpers for request validation and client metadata.

use axum::http::HeaderMap;
use regex::Regex;

use crate::audit::RequestMeta;

pub(super) const MIN_PASSWORD_LENGTH: usize = 12;
pub(super) const MAX_PASSWORD_LENGTH: usize = 128;

/// Basic email format check on already-trimmed input.
pub(super) fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email))
}

/// Usernames are 3-32 chars of lowercase alphanumerics, `-`, `_`.
pub(super) fn valid_username(username: &str) -> bool {
    Regex::new(r"^[a-z0-9_-]{3,32}$").is_ok_and(|regex| regex.is_match(username))
}

pub(super) fn valid_password(password: &str) -> bool {
    (MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&password.len())
}

/// Extract a client IP from common proxy headers.
pub(super) fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(ip) = forwarded {
        return Some(ip.to_string());
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Collect the request context attached to audit rows.
pub(super) fn request_meta(headers: &HeaderMap) -> RequestMeta {
    RequestMeta {
        origin: extract_client_ip(headers),
        user_agent: headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn email_validation() {
        assert!(valid_email("a@x.com"));
        assert!(valid_email("first.last@sub.example.org"));
        assert!(!valid_email("a@x"));
        assert!(!valid_email("no-at-sign"));
        assert!(!valid_email("two@@x.com"));
        assert!(!valid_email("spaces in@x.com"));
    }

    #[test]
    fn username_validation() {
        assert!(valid_username("alice"));
        assert!(valid_username("a-b_c1"));
        assert!(!valid_username("ab"));
        assert!(!valid_username("Has-Caps"));
        assert!(!valid_username("way@invalid"));
    }

    #[test]
    fn password_length_bounds() {
        assert!(!valid_password("short"));
        assert!(valid_password(&"x".repeat(12)));
        assert!(valid_password(&"x".repeat(128)));
        assert!(!valid_password(&"x".repeat(129)));
    }

    #[test]
    fn client_ip_prefers_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, 5.6.7.8"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_client_ip(&headers), Some("1.2.3.4".to_string()));

        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_client_ip(&headers), Some("9.9.9.9".to_string()));

        assert_eq!(extract_client_ip(&HeaderMap::new()), None);
    }
}
