//! Session and frontend arguments for the server command.

use clap::{Arg, Command};

pub const ARG_SESSION_KEY: &str = "session-key";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_FRONTEND_URL: &str = "frontend-url";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SESSION_KEY)
                .long(ARG_SESSION_KEY)
                .help("Secret key used to sign session tokens (at least 32 bytes)")
                .env("LERNEJO_SESSION_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Absolute session lifetime in seconds")
                .default_value("86400")
                .env("LERNEJO_SESSION_TTL_SECONDS")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_FRONTEND_URL)
                .long(ARG_FRONTEND_URL)
                .help("Frontend base URL, used for CORS and cookie security")
                .default_value("http://localhost:3000")
                .env("LERNEJO_FRONTEND_URL"),
        )
}

#[derive(Debug, Clone)]
pub struct Options {
    pub session_key: String,
    pub session_ttl_seconds: i64,
    pub frontend_url: String,
}

impl Options {
    /// Extract session options from parsed matches.
    ///
    /// # Errors
    /// Returns an error if the session key is missing or too short.
    pub fn parse(matches: &clap::ArgMatches) -> anyhow::Result<Self> {
        let session_key = matches
            .get_one::<String>(ARG_SESSION_KEY)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --session-key"))?;

        if session_key.len() < 32 {
            anyhow::bail!("session key must be at least 32 bytes");
        }

        let session_ttl_seconds = matches
            .get_one::<i64>(ARG_SESSION_TTL_SECONDS)
            .copied()
            .unwrap_or(86_400);

        let frontend_url = matches
            .get_one::<String>(ARG_FRONTEND_URL)
            .cloned()
            .unwrap_or_else(|| "http://localhost:3000".to_string());

        Ok(Self {
            session_key,
            session_ttl_seconds,
            frontend_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command() -> Command {
        with_args(Command::new("test").no_binary_name(true))
    }

    #[test]
    fn parse_accepts_long_key() {
        let matches = command().get_matches_from([
            "--session-key",
            "0123456789abcdef0123456789abcdef",
            "--session-ttl-seconds",
            "3600",
        ]);
        let options = Options::parse(&matches).expect("options");
        assert_eq!(options.session_ttl_seconds, 3600);
        assert_eq!(options.frontend_url, "http://localhost:3000");
    }

    #[test]
    fn parse_rejects_short_key() {
        let matches = command().get_matches_from(["--session-key", "short"]);
        assert!(Options::parse(&matches).is_err());
    }
}
