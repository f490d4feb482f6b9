//! Module commands: search, info, install.

use clap::Subcommand;

use crate::catalog::{Catalog, ModuleId};
use crate::container::Docker;
use crate::install::install_module;

use super::{Session, format};

#[derive(Debug, Subcommand)]
pub enum ModuleCommand {
    /// List catalog modules whose `<repo>/<module>:<version>` contains a substring.
    Search {
        /// Substring to look for (default: list everything).
        #[arg(default_value = "")]
        needle: String,
    },

    /// Show a module version: image, mounts and commands.
    Info {
        /// `<repo>/<module>` or `<repo>/<module>:<version>`.
        id: String,
    },

    /// Install a module version into the selected environment.
    ///
    /// Pulls the image unless it is already present.
    Install {
        /// `<repo>/<module>` or `<repo>/<module>:<version>`.
        /// Without a version, the one marked latest is installed.
        id: String,
    },
}

pub(super) fn run(session: &Session<'_>, command: ModuleCommand) -> Result<(), String> {
    let catalog =
        Catalog::load(session.layout).map_err(|e| format!("failed to load catalog: {e}"))?;

    match command {
        ModuleCommand::Search { needle } => cmd_search(&catalog, &needle),
        ModuleCommand::Info { id } => cmd_info(&catalog, &id),
        ModuleCommand::Install { id } => cmd_install(session, &catalog, &id),
    }
}

fn parse_id(raw: &str) -> Result<ModuleId, String> {
    raw.parse().map_err(|e| format!("{e}"))
}

fn cmd_search(catalog: &Catalog, needle: &str) -> Result<(), String> {
    let found = catalog.search(needle);
    if found.is_empty() {
        println!("No modules found");
        return Ok(());
    }
    for key in found {
        println!("{key}");
    }
    Ok(())
}

fn cmd_info(catalog: &Catalog, raw: &str) -> Result<(), String> {
    let id = parse_id(raw)?;
    let module = catalog
        .get_module(
            &id.repository,
            &id.module,
            id.version.as_deref().unwrap_or_default(),
        )
        .map_err(|e| format!("{e}"))?;

    print!("{}", format::module_info(&module));
    Ok(())
}

fn cmd_install(session: &Session<'_>, catalog: &Catalog, raw: &str) -> Result<(), String> {
    let id = parse_id(raw)?;
    let mut env = session.current()?;

    let record = install_module(catalog, &session.storage, &Docker::default(), &mut env, &id)
        .map_err(|e| format!("failed to install {id}: {e}"))?;

    println!(
        "Installed module {}:{} to environment {}",
        record.name, record.version, env.uuid
    );
    Ok(())
}
