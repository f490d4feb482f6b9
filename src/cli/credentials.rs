//! Cloud credentials commands.

use clap::Subcommand;

use crate::config::Credentials;

use super::Session;

#[derive(Debug, Subcommand)]
pub enum CredentialsCommand {
    /// Store an already provisioned service principal in the global config.
    ///
    /// Modules can reference the fields as
    /// `{{ .AzureConfig.Credentials.AppID }}` and so on.
    Set {
        #[arg(long)]
        app_id: String,

        #[arg(long)]
        password: String,

        #[arg(long)]
        tenant: String,

        #[arg(long)]
        subscription_id: String,
    },
}

pub(super) fn run(session: &mut Session<'_>, command: CredentialsCommand) -> Result<(), String> {
    match command {
        CredentialsCommand::Set {
            app_id,
            password,
            tenant,
            subscription_id,
        } => {
            let path = session.config_path().to_path_buf();
            session
                .config
                .set_credentials(
                    Credentials {
                        app_id,
                        password,
                        tenant,
                        subscription_id,
                    },
                    &path,
                )
                .map_err(|e| format!("failed to save credentials: {e}"))?;

            println!("Saved credentials to {}", path.display());
            Ok(())
        }
    }
}
