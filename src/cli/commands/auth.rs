use anyhow::{Context, Result};
use clap::{builder::BoolishValueParser, Arg, ArgAction, Command};

pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub session_ttl_seconds: i64,
    pub cookie_secure: bool,
    pub frontend_base_url: Option<String>,
}

impl Options {
    /// # Errors
    /// Returns an error if the session TTL is missing or not positive.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        let session_ttl_seconds = matches
            .get_one::<i64>(ARG_SESSION_TTL_SECONDS)
            .copied()
            .context("missing required argument: --session-ttl-seconds")?;
        if session_ttl_seconds <= 0 {
            anyhow::bail!("--session-ttl-seconds must be positive");
        }

        Ok(Self {
            session_ttl_seconds,
            cookie_secure: matches.get_flag(ARG_COOKIE_SECURE),
            frontend_base_url: matches.get_one::<String>(ARG_FRONTEND_BASE_URL).cloned(),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session TTL in seconds")
                .env("OVERSEER_SESSION_TTL_SECONDS")
                .default_value("43200")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECURE)
                .long(ARG_COOKIE_SECURE)
                .help("Mark the session cookie as Secure (HTTPS only)")
                .env("OVERSEER_COOKIE_SECURE")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Console origin allowed by CORS, example: https://console.overseer.dev")
                .env("OVERSEER_FRONTEND_BASE_URL"),
        )
}
