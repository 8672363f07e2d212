use crate::{api, auth::AuthConfig, mailer::OutboxWorkerConfig};
use anyhow::Result;
use secrecy::SecretString;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub redis_url: String,
    pub access_secret: SecretString,
    pub refresh_secret: SecretString,
    pub codec_key: [u8; 32],
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub action_token_ttl_seconds: i64,
    pub totp_issuer: String,
    pub lockout_max_attempts: u32,
    pub lockout_window_seconds: u64,
    pub otp_ttl_seconds: i64,
    pub otp_max_attempts: u32,
    pub otp_max_resends: u32,
    pub outbox_poll_seconds: u64,
    pub outbox_batch_size: usize,
    pub outbox_max_attempts: u32,
}

/// Execute the server action.
///
/// # Errors
/// Returns an error if the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = AuthConfig::new(args.access_secret, args.refresh_secret, args.codec_key)
        .with_access_token_ttl_seconds(args.access_ttl_seconds)
        .with_refresh_token_ttl_seconds(args.refresh_ttl_seconds)
        .with_action_token_ttl_seconds(args.action_token_ttl_seconds)
        .with_totp_issuer(args.totp_issuer)
        .with_lockout_max_attempts(args.lockout_max_attempts)
        .with_lockout_window_seconds(args.lockout_window_seconds)
        .with_otp_ttl_seconds(args.otp_ttl_seconds)
        .with_otp_max_attempts(args.otp_max_attempts)
        .with_otp_max_resends(args.otp_max_resends);

    let worker_config = OutboxWorkerConfig::new()
        .with_poll_interval_seconds(args.outbox_poll_seconds)
        .with_batch_size(args.outbox_batch_size)
        .with_max_attempts(args.outbox_max_attempts)
        .normalize();

    api::serve(
        args.port,
        &args.dsn,
        &args.redis_url,
        auth_config,
        worker_config,
    )
    .await
}
