//! SSH keypair commands.

use clap::Subcommand;

use crate::keygen::{DEFAULT_KEY_NAME, Keygen};
use crate::layout::ensure_directory;

use super::Session;

#[derive(Debug, Subcommand)]
pub enum SshCommand {
    /// Manage generated keypairs.
    Keygen {
        #[command(subcommand)]
        command: KeygenCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum KeygenCommand {
    /// Generate an RSA keypair in the selected environment's shared directory.
    ///
    /// Modules can reference it as `{{ .SSHConfig.RSAKeyPair.Name }}`.
    Create {
        /// Key file name.
        #[arg(long, default_value = DEFAULT_KEY_NAME)]
        name: String,
    },
}

pub(super) fn run(session: &Session<'_>, command: SshCommand) -> Result<(), String> {
    match command {
        SshCommand::Keygen {
            command: KeygenCommand::Create { name },
        } => cmd_create(session, &name),
    }
}

fn cmd_create(session: &Session<'_>, name: &str) -> Result<(), String> {
    let env = session.current()?;
    let shared = session.storage.shared_dir(env.uuid);
    ensure_directory(&shared).map_err(|e| e.to_string())?;

    let handle = Keygen::default()
        .create(&shared, name)
        .map_err(|e| format!("failed to generate keypair: {e}"))?;
    session
        .storage
        .update(env.uuid, |env| env.set_keypair(handle))
        .map_err(|e| format!("failed to save environment {}: {e}", env.uuid))?;

    println!(
        "Created keypair {name} in {} for environment {}",
        shared.display(),
        env.uuid
    );
    Ok(())
}
