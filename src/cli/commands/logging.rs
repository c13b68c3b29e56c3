use clap::{Arg, Command, builder::ValueParser};

pub const ARG_VERBOSITY: &str = "verbosity";
pub const ARG_LOG_FORMAT: &str = "log-format";

/// Accepts a level name or its index (`error`=0 .. `trace`=4).
#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>()
            && parsed <= 4
        {
            return Ok(parsed);
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
    command
        .arg(
            Arg::new(ARG_VERBOSITY)
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("DBAUTH_LOG_LEVEL")
                .global(true)
                .action(clap::ArgAction::Count)
                .value_parser(validator_log_level()),
        )
        .arg(
            Arg::new(ARG_LOG_FORMAT)
                .long("log-format")
                .help("Log output format")
                .env("DBAUTH_LOG_FORMAT")
                .default_value("pretty")
                .value_parser(["pretty", "json"]),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_names_and_numbers() {
        for (level, expected) in [("error", 0u8), ("WARN", 1), ("3", 3), ("trace", 4)] {
            temp_env::with_var("DBAUTH_LOG_LEVEL", Some(level), || {
                let matches = with_args(Command::new("dbauth")).get_matches_from(["dbauth"]);
                assert_eq!(
                    matches.get_one::<u8>(ARG_VERBOSITY).copied(),
                    Some(expected),
                    "level {level}"
                );
            });
        }
    }

    #[test]
    fn invalid_log_level_is_rejected() {
        for level in ["loud", "9"] {
            temp_env::with_var("DBAUTH_LOG_LEVEL", Some(level), || {
                let result = with_args(Command::new("dbauth")).try_get_matches_from(["dbauth"]);
                assert!(result.is_err(), "level {level}");
            });
        }
    }

    #[test]
    fn log_format_defaults_to_pretty() {
        temp_env::with_var("DBAUTH_LOG_FORMAT", None::<&str>, || {
            let matches = with_args(Command::new("dbauth")).get_matches_from(["dbauth"]);
            assert_eq!(
                matches.get_one::<String>(ARG_LOG_FORMAT).map(String::as_str),
                Some("pretty")
            );
        });
    }
}
