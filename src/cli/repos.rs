//! Catalog repository commands: list, install.

use clap::Subcommand;

use crate::catalog::{Catalog, remote};

use super::Session;

#[derive(Debug, Subcommand)]
pub enum ReposCommand {
    /// List every module version in the installed catalogs.
    List,

    /// Fetch a catalog and store it under the repos directory.
    ///
    /// Accepts a direct `.yaml`/`.yml` URL, a git URL, or `<user>/<repo>`
    /// on GitHub.
    Install {
        /// Catalog location.
        spec: String,

        /// Replace a catalog already installed under the same name.
        #[arg(long)]
        force: bool,

        /// Branch to clone (git sources only).
        #[arg(long)]
        branch: Option<String>,
    },
}

pub(super) fn run(session: &Session<'_>, command: ReposCommand) -> Result<(), String> {
    match command {
        ReposCommand::List => cmd_list(session),
        ReposCommand::Install {
            spec,
            force,
            branch,
        } => cmd_install(session, &spec, force, branch.as_deref()),
    }
}

fn cmd_list(session: &Session<'_>) -> Result<(), String> {
    let catalog =
        Catalog::load(session.layout).map_err(|e| format!("failed to load catalog: {e}"))?;

    if catalog.repositories().is_empty() {
        println!("No repositories installed");
        return Ok(());
    }
    print!("{}", catalog.list());
    Ok(())
}

fn cmd_install(
    session: &Session<'_>,
    spec: &str,
    force: bool,
    branch: Option<&str>,
) -> Result<(), String> {
    let (path, repository) = remote::install(session.layout, spec, force, branch)
        .map_err(|e| format!("failed to install repository {spec}: {e}"))?;

    let versions: usize = repository
        .components
        .iter()
        .map(|c| c.versions.len())
        .sum();
    println!(
        "Installed repository {} ({} modules, {versions} versions) to {}",
        repository.name,
        repository.components.len(),
        path.display()
    );
    Ok(())
}
