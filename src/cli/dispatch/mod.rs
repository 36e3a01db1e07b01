//! Map parsed CLI arguments to the action the binary runs.

use crate::cli::{
    actions::{bootstrap, server, Action},
    commands::{self, auth},
};
use anyhow::{Context, Result};

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let dsn = matches
        .get_one::<String>(commands::ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;
    let init_schema = matches.get_flag(commands::ARG_INIT_SCHEMA);

    if let Some(sub) = matches.subcommand_matches(commands::bootstrap::SUBCOMMAND) {
        let options = commands::bootstrap::Options::parse(sub)?;
        return Ok(Action::Bootstrap(bootstrap::Args {
            dsn,
            init_schema,
            email: options.email,
            password: options.password,
        }));
    }

    let port = matches
        .get_one::<u16>(commands::ARG_PORT)
        .copied()
        .unwrap_or(8080);
    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(server::Args {
        port,
        dsn,
        init_schema,
        frontend_base_url: auth_opts.frontend_base_url,
        session_ttl_seconds: auth_opts.session_ttl_seconds,
        cookie_secure: auth_opts.cookie_secure,
    }))
}
