use clap::{Arg, Command, builder::ValueParser};

pub const ARG_VERBOSITY: &str = "verbosity";

#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        // Accept a bare count as well as a level name
        if let Ok(parsed) = level.parse::<u8>() {
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
            .env("VIGILO_LOG_LEVEL")
            .global(true)
            .action(clap::ArgAction::Count)
            .value_parser(validator_log_level()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command() -> Command {
        with_args(Command::new("vigilo"))
    }

    #[test]
    fn test_verbosity_count() {
        let matches = command().get_matches_from(vec!["vigilo", "-vvv"]);
        assert_eq!(matches.get_one::<u8>(ARG_VERBOSITY).copied(), Some(3));
    }

    #[test]
    fn test_log_level_from_env_names() {
        for (name, expected) in [
            ("error", 0_u8),
            ("warn", 1),
            ("info", 2),
            ("DEBUG", 3),
            ("trace", 4),
        ] {
            temp_env::with_var("VIGILO_LOG_LEVEL", Some(name), || {
                let matches = command().get_matches_from(vec!["vigilo"]);
                assert_eq!(
                    matches.get_one::<u8>(ARG_VERBOSITY).copied(),
                    Some(expected)
                );
            });
        }
    }

    #[test]
    fn test_invalid_log_level() {
        temp_env::with_var("VIGILO_LOG_LEVEL", Some("loud"), || {
            let result = command().try_get_matches_from(vec!["vigilo"]);
            assert!(result.is_err());
        });
    }
}
