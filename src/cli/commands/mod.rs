pub mod auth;
pub mod logging;
pub mod outbox;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let command = Command::new("vigilo")
        .about("Authentication backend")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("VIGILO_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("dsn")
                .short('d')
                .long("dsn")
                .help("Database connection string")
                .env("VIGILO_DSN")
                .required(true),
        )
        .arg(
            Arg::new("redis-url")
                .long("redis-url")
                .help("Redis connection URL for counters and lockout state")
                .env("VIGILO_REDIS_URL")
                .required(true),
        );

    let command = auth::with_args(command);
    let command = outbox::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED_ENV: [(&str, Option<&str>); 5] = [
        ("VIGILO_DSN", Some("postgres://localhost:5432/vigilo")),
        ("VIGILO_REDIS_URL", Some("redis://localhost:6379")),
        ("VIGILO_ACCESS_SECRET", Some("access-secret")),
        ("VIGILO_REFRESH_SECRET", Some("refresh-secret")),
        (
            "VIGILO_CODEC_KEY",
            Some("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"),
        ),
    ];

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "vigilo");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some("Authentication backend".to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_defaults_from_env() {
        temp_env::with_vars(REQUIRED_ENV, || {
            let matches = new().get_matches_from(vec!["vigilo"]);
            assert_eq!(matches.get_one::<u16>("port").copied(), Some(8080));
            assert_eq!(
                matches.get_one::<String>("dsn").map(String::as_str),
                Some("postgres://localhost:5432/vigilo")
            );
            assert_eq!(
                matches.get_one::<i64>("access-ttl-seconds").copied(),
                Some(900)
            );
            assert_eq!(
                matches.get_one::<u32>("lockout-max-attempts").copied(),
                Some(5)
            );
            assert_eq!(matches.get_one::<u32>("otp-max-resends").copied(), Some(3));
        });
    }

    #[test]
    fn test_missing_dsn_fails() {
        temp_env::with_vars(
            [
                ("VIGILO_DSN", None::<&str>),
                ("VIGILO_REDIS_URL", Some("redis://localhost:6379")),
                ("VIGILO_ACCESS_SECRET", Some("a")),
                ("VIGILO_REFRESH_SECRET", Some("r")),
                ("VIGILO_CODEC_KEY", Some("k")),
            ],
            || {
                let result = new().try_get_matches_from(vec!["vigilo"]);
                assert!(result.is_err());
            },
        );
    }

    #[test]
    fn test_port_override() {
        temp_env::with_vars(REQUIRED_ENV, || {
            let matches = new().get_matches_from(vec!["vigilo", "--port", "9090"]);
            assert_eq!(matches.get_one::<u16>("port").copied(), Some(9090));
        });
    }
}
