use crate::{
    api::{self, AuthConfig},
    cli::telemetry,
};
use anyhow::Result;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub init_schema: bool,
    pub frontend_base_url: Option<String>,
    pub session_ttl_seconds: i64,
    pub cookie_secure: bool,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = AuthConfig::new()
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_session_cookie_secure(args.cookie_secure);

    debug!(
        port = args.port,
        init_schema = args.init_schema,
        session_ttl_seconds = args.session_ttl_seconds,
        "starting server"
    );

    let result = api::new(
        args.port,
        args.dsn,
        args.init_schema,
        args.frontend_base_url,
        auth_config,
    )
    .await;

    telemetry::shutdown_tracer();

    result
}
