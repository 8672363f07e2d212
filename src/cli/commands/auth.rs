use clap::{Arg, Command};

pub const ARG_ACCESS_SECRET: &str = "access-secret";
pub const ARG_REFRESH_SECRET: &str = "refresh-secret";
pub const ARG_CODEC_KEY: &str = "codec-key";

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_secret_args(command);
    let command = with_token_args(command);
    let command = with_lockout_args(command);
    with_otp_args(command)
}

fn with_secret_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACCESS_SECRET)
                .long(ARG_ACCESS_SECRET)
                .help("HMAC secret for signing access tokens")
                .env("VIGILO_ACCESS_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_REFRESH_SECRET)
                .long(ARG_REFRESH_SECRET)
                .help("HMAC secret for signing refresh tokens")
                .env("VIGILO_REFRESH_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_CODEC_KEY)
                .long(ARG_CODEC_KEY)
                .help("Base64-encoded 32-byte key for encrypting TOTP secrets at rest")
                .env("VIGILO_CODEC_KEY")
                .hide_env_values(true)
                .required(true),
        )
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("access-ttl-seconds")
                .long("access-ttl-seconds")
                .help("Access token TTL in seconds")
                .env("VIGILO_ACCESS_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("refresh-ttl-seconds")
                .long("refresh-ttl-seconds")
                .help("Refresh token TTL in seconds")
                .env("VIGILO_REFRESH_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("action-token-ttl-seconds")
                .long("action-token-ttl-seconds")
                .help("Email verification and password reset token TTL in seconds")
                .env("VIGILO_ACTION_TOKEN_TTL_SECONDS")
                .default_value("1800")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("totp-issuer")
                .long("totp-issuer")
                .help("Issuer shown in authenticator apps for provisioned TOTP secrets")
                .env("VIGILO_TOTP_ISSUER")
                .default_value("vigilo"),
        )
}

fn with_lockout_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("lockout-max-attempts")
                .long("lockout-max-attempts")
                .help("Failed login attempts before an account is locked")
                .env("VIGILO_LOCKOUT_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("lockout-window-seconds")
                .long("lockout-window-seconds")
                .help("Sliding window and lock duration for failed login attempts")
                .env("VIGILO_LOCKOUT_WINDOW_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64)),
        )
}

fn with_otp_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("otp-ttl-seconds")
                .long("otp-ttl-seconds")
                .help("Email one-time code TTL in seconds")
                .env("VIGILO_OTP_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("otp-max-attempts")
                .long("otp-max-attempts")
                .help("Wrong guesses before an email code is invalidated")
                .env("VIGILO_OTP_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("otp-max-resends")
                .long("otp-max-resends")
                .help("Email code resends allowed per lockout window")
                .env("VIGILO_OTP_MAX_RESENDS")
                .default_value("3")
                .value_parser(clap::value_parser!(u32)),
        )
}
