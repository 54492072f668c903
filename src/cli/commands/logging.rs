use clap::{builder::ValueParser, Arg, Command};

pub const ARG_VERBOSITY: &str = "verbosity";

#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
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
            .env("LERNEJO_LOG_LEVEL")
            .global(true)
            .action(clap::ArgAction::Count)
            .value_parser(validator_log_level()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_accepts_numbers_and_names() {
        let parser = validator_log_level();
        let command = Command::new("test").arg(
            Arg::new("level")
                .long("level")
                .value_parser(parser)
                .action(clap::ArgAction::Set),
        );
        let matches = command
            .clone()
            .get_matches_from(["test", "--level", "debug"]);
        assert_eq!(matches.get_one::<u8>("level"), Some(&3));

        let matches = command.get_matches_from(["test", "--level", "2"]);
        assert_eq!(matches.get_one::<u8>("level"), Some(&2));
    }

    #[test]
    fn log_level_rejects_unknown_names() {
        let command = Command::new("test").arg(
            Arg::new("level")
                .long("level")
                .value_parser(validator_log_level())
                .action(clap::ArgAction::Set),
        );
        let result = command.try_get_matches_from(["test", "--level", "loud"]);
        assert!(result.is_err());
    }
}
