use anyhow::{Context, Result};
use clap::{Arg, Command};
use secrecy::SecretString;

pub const SUBCOMMAND: &str = "bootstrap";
pub const ARG_EMAIL: &str = "email";
pub const ARG_PASSWORD: &str = "password";

#[derive(Debug)]
pub struct Options {
    pub email: String,
    pub password: SecretString,
}

impl Options {
    /// # Errors
    /// Returns an error if email or password are missing.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        let email = matches
            .get_one::<String>(ARG_EMAIL)
            .cloned()
            .context("missing required argument: --email")?;
        let password = matches
            .get_one::<String>(ARG_PASSWORD)
            .map(|password| SecretString::from(password.as_str()))
            .context("missing required argument: --password")?;
        Ok(Self { email, password })
    }
}

#[must_use]
pub fn subcommand() -> Command {
    Command::new(SUBCOMMAND)
        .about("Create the root user and its Root admin record (only once)")
        .arg(
            Arg::new(ARG_EMAIL)
                .long(ARG_EMAIL)
                .help("Email of the root user")
                .env("OVERSEER_ROOT_EMAIL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_PASSWORD)
                .long(ARG_PASSWORD)
                .help("Password of the root user")
                .env("OVERSEER_ROOT_PASSWORD")
                .hide_env_values(true)
                .required(true),
        )
}
