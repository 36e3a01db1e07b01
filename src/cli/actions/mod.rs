pub mod bootstrap;
pub mod server;

// Single dispatch point for `Action`.
mod run;

#[derive(Debug)]
pub enum Action {
    Server(server::Args),
    Bootstrap(bootstrap::Args),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
