//! # Vigilo (Authentication Backend)
//!
//! `vigilo` is an authentication backend: registration, password login,
//! stateless access tokens with rotating refresh tokens, and second factors
//! (TOTP, email one-time codes, recovery codes).
//!
//! ## Sessions & Tokens
//!
//! Access tokens are short-lived JWTs verified offline. Refresh tokens are
//! opaque, stored server-side as SHA-256 hashes, and rotated on every use; a
//! replayed refresh token is rejected because its session row is gone.
//!
//! ## Account Safety
//!
//! - **Lockout:** repeated credential failures lock the account for a sliding
//!   window tracked in Redis. Unlocking happens on window expiry, password
//!   reset, or an admin unlock.
//! - **Enumeration:** login failures, unknown identifiers, and
//!   forgot-password requests are indistinguishable to the caller.
//! - **Step-up:** disabling a second factor requires the current password.
//!
//! ## Email Delivery
//!
//! Outbound mail (verification links, one-time codes, lockout notices) is
//! queued in a Postgres outbox and drained by a background worker with
//! exponential backoff, so user-facing requests never wait on a mail server.

pub mod api;
pub mod audit;
pub mod auth;
pub mod cache;
pub mod cli;
pub mod lockout;
pub mod mailer;
pub mod otp;
pub mod storage;
pub mod totp;

#[cfg(test)]
pub(crate) mod testing;

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
