//! Command-line argument dispatch and server initialization.
//!
//! Parses validated CLI arguments and maps them to the appropriate action,
//! such as starting the API server with its full configuration state.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::auth::{ARG_ACCESS_SECRET, ARG_CODEC_KEY, ARG_REFRESH_SECRET};
use anyhow::{Context, Result};
use base64::{Engine, engine::general_purpose::STANDARD};
use secrecy::SecretString;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;
    let redis_url = matches
        .get_one::<String>("redis-url")
        .cloned()
        .context("missing required argument: --redis-url")?;

    let access_secret = matches
        .get_one::<String>(ARG_ACCESS_SECRET)
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --access-secret")?;
    let refresh_secret = matches
        .get_one::<String>(ARG_REFRESH_SECRET)
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --refresh-secret")?;
    let codec_key = matches
        .get_one::<String>(ARG_CODEC_KEY)
        .context("missing required argument: --codec-key")
        .and_then(|encoded| parse_codec_key(encoded))?;

    Ok(Action::Server(Box::new(Args {
        port,
        dsn,
        redis_url,
        access_secret,
        refresh_secret,
        codec_key,
        access_ttl_seconds: get_or_default(matches, "access-ttl-seconds", 900),
        refresh_ttl_seconds: get_or_default(matches, "refresh-ttl-seconds", 604_800),
        action_token_ttl_seconds: get_or_default(matches, "action-token-ttl-seconds", 1800),
        totp_issuer: matches
            .get_one::<String>("totp-issuer")
            .cloned()
            .unwrap_or_else(|| "vigilo".to_string()),
        lockout_max_attempts: get_or_default(matches, "lockout-max-attempts", 5_u32),
        lockout_window_seconds: get_or_default(matches, "lockout-window-seconds", 900_u64),
        otp_ttl_seconds: get_or_default(matches, "otp-ttl-seconds", 300),
        otp_max_attempts: get_or_default(matches, "otp-max-attempts", 5_u32),
        otp_max_resends: get_or_default(matches, "otp-max-resends", 3_u32),
        outbox_poll_seconds: get_or_default(matches, "email-outbox-poll-seconds", 5_u64),
        outbox_batch_size: get_or_default(matches, "email-outbox-batch-size", 10_usize),
        outbox_max_attempts: get_or_default(matches, "email-outbox-max-attempts", 5_u32),
    })))
}

fn get_or_default<T: Clone + Send + Sync + 'static>(
    matches: &clap::ArgMatches,
    id: &str,
    default: T,
) -> T {
    matches.get_one::<T>(id).cloned().unwrap_or(default)
}

/// The codec key must decode to exactly 32 bytes (AES-256-GCM).
fn parse_codec_key(encoded: &str) -> Result<[u8; 32]> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .context("invalid --codec-key: not valid base64")?;
    let key: [u8; 32] = bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("invalid --codec-key: must decode to 32 bytes"))?;
    Ok(key)
}
