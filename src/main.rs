mod archive;
mod catalog;
mod cli;
mod config;
mod container;
mod execute;
mod install;
mod keygen;
mod layout;
mod model;
mod storage;
mod template;

use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use layout::Layout;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let Some(root) = cli.root.clone().or_else(Layout::default_root) else {
        eprintln!(
            "Error: could not determine home directory, pass --root or set {}",
            layout::ROOT_ENV
        );
        process::exit(1);
    };

    let layout = match layout::initialize(root) {
        Ok(layout) => layout,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    tracing::debug!(root = %layout.root().display(), "using harbor root");

    if let Err(e) = cli::run(cli.command, layout) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Logs go to stderr so command output on stdout stays clean.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
