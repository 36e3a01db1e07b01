use crate::cli::actions::{bootstrap, server, Action};
use anyhow::Result;

/// Execute the provided action.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Server(args) => server::execute(args).await,
        Action::Bootstrap(args) => bootstrap::execute(args).await,
    }
}
