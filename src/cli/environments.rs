//! Environment commands: new, use, list, info, run, export, import.

use std::env;
use std::path::{Path, PathBuf};

use clap::Subcommand;

use crate::archive;
use crate::container::Docker;
use crate::execute;

use super::{Session, format, parse_env_id};

#[derive(Debug, Subcommand)]
pub enum EnvironmentsCommand {
    /// Create an environment. Prints its id.
    ///
    /// The new environment is selected when none is selected yet.
    New {
        /// Display name. Need not be unique.
        #[arg(long)]
        name: String,
    },

    /// Select the environment other commands act on.
    Use {
        /// Environment id.
        id: String,
    },

    /// List environments. The selected one is marked with `*`.
    List,

    /// Show an environment's modules and keypair.
    Info {
        /// Environment id (default: the selected environment).
        id: Option<String>,
    },

    /// Run a command of an installed module in a container.
    Run {
        /// Installed module name.
        module: String,

        /// Command name, as listed by `module info`.
        command: String,
    },

    /// Write an environment to `<destination>/<id>.zip`.
    Export {
        /// Environment id (default: the selected environment).
        #[arg(long)]
        id: Option<String>,

        /// Directory to write the archive to (default: the working directory).
        #[arg(long)]
        destination: Option<PathBuf>,
    },

    /// Import an exported environment and select it.
    Import {
        /// Archive written by `export`.
        #[arg(long)]
        from: PathBuf,
    },
}

pub(super) fn run(session: &mut Session<'_>, command: EnvironmentsCommand) -> Result<(), String> {
    match command {
        EnvironmentsCommand::New { name } => cmd_new(session, &name),
        EnvironmentsCommand::Use { id } => cmd_use(session, &id),
        EnvironmentsCommand::List => cmd_list(session),
        EnvironmentsCommand::Info { id } => cmd_info(session, id.as_deref()),
        EnvironmentsCommand::Run { module, command } => cmd_run(session, &module, &command),
        EnvironmentsCommand::Export { id, destination } => {
            cmd_export(session, id.as_deref(), destination)
        }
        EnvironmentsCommand::Import { from } => cmd_import(session, &from),
    }
}

fn cmd_new(session: &mut Session<'_>, name: &str) -> Result<(), String> {
    let env = session
        .storage
        .create(name)
        .map_err(|e| format!("failed to create environment: {e}"))?;

    println!("Created an environment with id {}", env.uuid);

    if session.config.current().is_none() {
        let path = session.config_path().to_path_buf();
        session
            .config
            .select_environment(&session.storage, env.uuid, &path)
            .map_err(|e| format!("failed to select environment {}: {e}", env.uuid))?;
    }
    Ok(())
}

fn cmd_use(session: &mut Session<'_>, raw: &str) -> Result<(), String> {
    let id = parse_env_id(raw)?;
    let path = session.config_path().to_path_buf();
    session
        .config
        .select_environment(&session.storage, id, &path)
        .map_err(|e| format!("failed to select environment: {e}"))?;

    println!("Using environment {id}");
    Ok(())
}

fn cmd_list(session: &Session<'_>) -> Result<(), String> {
    let envs = session
        .storage
        .get_all()
        .map_err(|e| format!("failed to list environments: {e}"))?;

    if envs.is_empty() {
        println!("No environments");
        return Ok(());
    }

    let current = session.config.current();
    for env in &envs {
        println!("{}", format::environment_line(env, current == Some(env.uuid)));
    }
    Ok(())
}

fn cmd_info(session: &Session<'_>, id: Option<&str>) -> Result<(), String> {
    let env = session.environment_or_current(id)?;
    print!("{}", format::environment_info(&env));
    Ok(())
}

fn cmd_run(session: &Session<'_>, module: &str, command: &str) -> Result<(), String> {
    let env = session.current()?;
    let ctx = session.template_context(&env);
    execute::run_command(
        &session.storage,
        &Docker::default(),
        &env,
        &ctx,
        module,
        command,
    )
    .map_err(|e| format!("failed to run {module} {command}: {e}"))
}

fn cmd_export(
    session: &Session<'_>,
    id: Option<&str>,
    destination: Option<PathBuf>,
) -> Result<(), String> {
    let label = id
        .map(str::to_string)
        .or_else(|| session.config.current().map(|id| id.to_string()))
        .unwrap_or_default();
    let fail =
        |cause: String| format!("Unable to export environment (environment id: {label}): {cause}");

    let env = session.environment_or_current(id).map_err(fail)?;
    let dest = match destination {
        Some(dir) => dir,
        None => env::current_dir().map_err(|e| fail(e.to_string()))?,
    };

    let path =
        archive::export(&session.storage, env.uuid, &dest).map_err(|e| fail(e.to_string()))?;
    println!("Exported environment {} to {}", env.uuid, path.display());
    Ok(())
}

fn cmd_import(session: &mut Session<'_>, from: &Path) -> Result<(), String> {
    let path = session.config_path().to_path_buf();
    let env = archive::import(
        &session.storage,
        &Docker::default(),
        &mut session.config,
        &path,
        from,
    )
    .map_err(|e| match e {
        archive::ArchiveError::IncorrectPath { .. } => e.to_string(),
        other => format!("failed to import {}: {other}", from.display()),
    })?;

    println!("Imported environment {} ({})", env.uuid, env.name);
    Ok(())
}
