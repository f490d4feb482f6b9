//! CLI interface for harbor.
//!
//! Commands are grouped by the thing they act on:
//!
//! - `harbor environments new|use|list|info|run|export|import`
//! - `harbor module search|info|install`
//! - `harbor repos list|install`
//! - `harbor ssh keygen create`
//! - `harbor credentials set`
//!
//! Most commands act on the current environment, chosen with
//! `harbor environments use <id>`.

mod credentials;
mod environments;
mod format;
mod module;
mod repos;
mod ssh;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::config::GlobalConfig;
use crate::layout::Layout;
use crate::model::Environment;
use crate::storage::{Storage, StorageError};
use crate::template::TemplateContext;

use credentials::CredentialsCommand;
use environments::EnvironmentsCommand;
use module::ModuleCommand;
use repos::ReposCommand;
use ssh::SshCommand;

/// Harbor: containerized tools in reproducible environments.
#[derive(Debug, Parser)]
#[command(name = "harbor", after_long_help = WORKFLOW_HELP)]
pub struct Cli {
    /// Root directory for harbor state (default: $HARBOR_HOME or ~/.harbor).
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Log debug output to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

const WORKFLOW_HELP: &str = r"Workflow:
  1. harbor repos install my-org/harbor-modules
  2. harbor environments new --name staging
     → prints the environment id and selects it
  3. harbor module search terraform
  4. harbor module install my-org-harbor-modules/terraform:0.12.28
  5. harbor environments run terraform plan

Move an environment between machines:
  harbor environments export --destination /tmp
  harbor environments import --from /tmp/<id>.zip";

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create, select, inspect and move environments.
    Environments {
        #[command(subcommand)]
        command: EnvironmentsCommand,
    },

    /// Find, inspect and install catalog modules.
    Module {
        #[command(subcommand)]
        command: ModuleCommand,
    },

    /// Manage module catalog repositories.
    Repos {
        #[command(subcommand)]
        command: ReposCommand,
    },

    /// SSH keypairs for the current environment.
    Ssh {
        #[command(subcommand)]
        command: SshCommand,
    },

    /// Cloud credentials made available to module templates.
    Credentials {
        #[command(subcommand)]
        command: CredentialsCommand,
    },
}

/// Run a parsed command, returning an error message on failure.
pub fn run(command: Command, layout: &Layout) -> Result<(), String> {
    let mut session = Session::open(layout)?;

    match command {
        Command::Environments { command } => environments::run(&mut session, command),
        Command::Module { command } => module::run(&session, command),
        Command::Repos { command } => repos::run(&session, command),
        Command::Ssh { command } => ssh::run(&session, command),
        Command::Credentials { command } => credentials::run(&mut session, command),
    }
}

/// Everything a command handler needs: paths, environments and global config.
struct Session<'a> {
    layout: &'a Layout,
    storage: Storage,
    config: GlobalConfig,
}

impl<'a> Session<'a> {
    fn open(layout: &'a Layout) -> Result<Self, String> {
        let storage = Storage::new(layout.environments_dir())
            .map_err(|e| format!("failed to open environments: {e}"))?;
        let config = GlobalConfig::load_or_create(layout.config_file())
            .map_err(|e| format!("failed to load config: {e}"))?;
        Ok(Self {
            layout,
            storage,
            config,
        })
    }

    fn config_path(&self) -> &Path {
        self.layout.config_file()
    }

    /// The selected environment.
    fn current(&self) -> Result<Environment, String> {
        let id = self
            .config
            .current()
            .ok_or("no environment selected; run `harbor environments use <id>`")?;
        self.environment(id)
    }

    /// The environment named by `id`, or the selected one when absent.
    fn environment_or_current(&self, id: Option<&str>) -> Result<Environment, String> {
        match id {
            Some(raw) => self.environment(parse_env_id(raw)?),
            None => self.current(),
        }
    }

    fn environment(&self, id: Uuid) -> Result<Environment, String> {
        self.storage.get(id).map_err(|e| match e {
            StorageError::NotFound(id) => format!("environment {id} not found"),
            other => format!("failed to load environment {id}: {other}"),
        })
    }

    /// Values module templates may reference for `env`.
    fn template_context(&self, env: &Environment) -> TemplateContext {
        TemplateContext {
            config: self.config.template_values(),
            environment: env.template_values(),
        }
    }
}

/// Parse an environment id from the command line.
///
/// Accepts the hyphenated, simple, braced and URN forms. Inputs of any other
/// length are rejected before parsing.
fn parse_env_id(raw: &str) -> Result<Uuid, String> {
    if !matches!(raw.len(), 32 | 36 | 38 | 45) {
        return Err(format!("invalid UUID length: {}", raw.len()));
    }
    Uuid::parse_str(raw).map_err(|e| format!("invalid environment id {raw:?}: {e}"))
}
