//! Output formatting for CLI display.

use std::fmt::Write;

use crate::model::{Environment, InstalledCommand, ResolvedModule};

/// One `environments list` line; the selected environment is marked `*`.
pub(super) fn environment_line(env: &Environment, selected: bool) -> String {
    let marker = if selected { '*' } else { ' ' };
    format!("{marker} {}  {}", env.uuid, env.name)
}

pub(super) fn environment_info(env: &Environment) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Name: {}", env.name);
    let _ = writeln!(out, "ID: {}", env.uuid);

    if env.installed.is_empty() {
        out.push_str("Modules: none\n");
    } else {
        out.push_str("Modules:\n");
        for module in &env.installed {
            let _ = writeln!(out, "  {}:{}  {}", module.name, module.version, module.image);
        }
    }

    if let Some(ssh) = &env.ssh_config {
        let _ = writeln!(out, "SSH keypair: {}", ssh.rsa_keypair.name);
    }
    out
}

pub(super) fn module_info(module: &ResolvedModule) -> String {
    let v = &module.version;
    let mut out = String::new();
    let _ = writeln!(out, "Name: {}", module.name);
    let _ = writeln!(out, "Repository: {}", module.repository);
    let _ = writeln!(out, "Type: {}", module.kind);
    let _ = writeln!(out, "Version: {}", v.version);
    let _ = writeln!(out, "Latest: {}", v.latest);
    let _ = writeln!(out, "Image: {}", v.image);
    let _ = writeln!(out, "Workdir: {}", v.workdir);
    if !v.mounts.is_empty() {
        let _ = writeln!(out, "Mounts: {}", v.mounts.join(", "));
    }
    if !v.shared.is_empty() {
        let _ = writeln!(out, "Shared: {}", v.shared);
    }
    if !v.commands.is_empty() {
        out.push_str("Commands:\n");
        for command in &v.commands {
            out.push_str(&command_line(command));
        }
    }
    out
}

fn command_line(command: &InstalledCommand) -> String {
    if command.description.is_empty() {
        format!("  {}\n", command.name)
    } else {
        format!("  {}: {}\n", command.name, command.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::catalog::Catalog;
    use crate::catalog::tests::write_repos;
    use crate::model::KeypairHandle;

    #[test]
    fn module_info_lists_fields() {
        let dir = tempfile::TempDir::new().unwrap();
        write_repos(dir.path());
        let catalog = Catalog::load_dir(dir.path()).unwrap();
        let module = catalog.get_module("example-repo", "c1", "0.1.0").unwrap();

        let out = module_info(&module);

        assert!(out.contains("Name: c1\n"));
        assert!(out.contains("Type: container\n"));
        assert!(out.contains("Version: 0.1.0\n"));
        assert!(out.contains("Image: docker.io/hashicorp/terraform:0.12.28\n"));
        assert!(out.contains("Mounts: /work\n"));
        assert!(out.contains("Commands:\n  version"));
    }

    #[test]
    fn environment_info_shows_keypair() {
        let mut env = Environment::new("t1");
        assert!(environment_info(&env).contains("Modules: none"));

        env.set_keypair(KeypairHandle {
            name: "id_rsa".into(),
        });
        assert!(environment_info(&env).contains("SSH keypair: id_rsa\n"));
    }

    #[test]
    fn selected_environment_is_marked() {
        let env = Environment::new("t1");
        assert!(environment_line(&env, true).starts_with("* "));
        assert!(environment_line(&env, false).starts_with("  "));
    }
}
