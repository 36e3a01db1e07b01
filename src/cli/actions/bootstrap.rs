use crate::{
    api::handlers::{auth::password::hash_password_blocking, normalize_email, require_password},
    store::{
        postgres::{apply_schema, PgStore},
        BootstrapOutcome, NewUser, Store, ROOT_GROUP, ROOT_USERNAME,
    },
};
use anyhow::{anyhow, Context, Result};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub dsn: String,
    pub init_schema: bool,
    pub email: String,
    pub password: SecretString,
}

/// Create the `root` user, its admin record and `Root` membership.
///
/// Running it again once a root user exists is a no-op.
///
/// # Errors
/// Returns an error if the input is invalid or the database cannot be written.
pub async fn execute(args: Args) -> Result<()> {
    let email =
        normalize_email(&args.email).map_err(|_| anyhow!("invalid email: {}", args.email))?;
    require_password(args.password.expose_secret())
        .map_err(|_| anyhow!("the root password must not be empty"))?;

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&args.dsn)
        .await
        .context("Failed to connect to database")?;

    if args.init_schema {
        apply_schema(&pool).await?;
        info!("Database schema applied");
    }

    let password_hash = hash_password_blocking(args.password.expose_secret().to_string()).await?;
    let store = PgStore::new(pool);

    let outcome = store
        .bootstrap_root(
            NewUser {
                username: ROOT_USERNAME.to_string(),
                email,
                password_hash,
            },
            ROOT_GROUP,
        )
        .await?;

    match outcome {
        BootstrapOutcome::Inserted(user) => {
            info!(user_id = %user.id, "Root user created");
            println!("Created root user {} ({})", user.username, user.email);
        }
        BootstrapOutcome::Closed => {
            warn!("Bootstrap skipped: a root user already exists");
            println!("Bootstrap is closed: a root user already exists");
        }
    }

    Ok(())
}
