//! Execution pipeline: run an installed module's command in a container.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::container::{ContainerError, ContainerRuntime, RunSpec};
use crate::layout::{LayoutError, ensure_directory};
use crate::model::{Environment, InstalledModule};
use crate::storage::Storage;
use crate::template::{self, TemplateContext};

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("module {0} is not installed")]
    NotInstalled(String),

    #[error("module {module} has type {kind:?}, only container modules can be run")]
    UnrunnableType { module: String, kind: String },

    #[error("module {module} has no command {command}")]
    UnknownCommand { module: String, command: String },

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Run(#[from] ContainerError),
}

/// Runs `command` of the installed module `module` in `env`.
pub fn run_command(
    storage: &Storage,
    runtime: &dyn ContainerRuntime,
    env: &Environment,
    ctx: &TemplateContext,
    module: &str,
    command: &str,
) -> Result<(), ExecError> {
    let spec = prepare(storage, env, ctx, module, command)?;
    tracing::debug!(module, command, image = %spec.image, "running");
    runtime.run(&spec)?;
    Ok(())
}

/// Builds the run spec, creating every host-side mount directory.
pub fn prepare(
    storage: &Storage,
    env: &Environment,
    ctx: &TemplateContext,
    module: &str,
    command: &str,
) -> Result<RunSpec, ExecError> {
    let installed = env
        .module(module)
        .ok_or_else(|| ExecError::NotInstalled(module.to_string()))?;

    if !installed.kind.is_container() {
        return Err(ExecError::UnrunnableType {
            module: module.to_string(),
            kind: installed.kind.to_string(),
        });
    }

    let mounts = mount_map(storage, env, installed);
    for host in mounts.values() {
        ensure_directory(host)?;
    }

    let cmd = installed
        .command(command)
        .ok_or_else(|| ExecError::UnknownCommand {
            module: module.to_string(),
            command: command.to_string(),
        })?;

    Ok(RunSpec {
        image: installed.image.clone(),
        command: cmd.command.clone(),
        args: cmd.args.iter().map(|a| template::render(a, ctx)).collect(),
        work_dir: installed.workdir.clone(),
        mounts,
        env: cmd
            .envs
            .iter()
            .map(|(k, v)| (k.clone(), template::render(v, ctx)))
            .collect(),
    })
}

/// Container path → host path for each module mount, plus the shared directory.
fn mount_map(
    storage: &Storage,
    env: &Environment,
    module: &InstalledModule,
) -> BTreeMap<String, PathBuf> {
    let base = storage.mounts_dir(env.uuid, &module.name, &module.version);
    let mut mounts: BTreeMap<String, PathBuf> = module
        .mounts
        .iter()
        .map(|container| {
            (
                container.clone(),
                base.join(container.trim_start_matches('/')),
            )
        })
        .collect();
    if !module.shared.is_empty() {
        mounts.insert(module.shared.clone(), storage.shared_dir(env.uuid));
    }
    mounts
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    use crate::catalog::{Catalog, ModuleId};
    use crate::catalog::tests::write_repos;
    use crate::container::fake::FakeRuntime;
    use crate::install::install_module;
    use crate::layout::Layout;
    use crate::model::ModuleKind;

    fn installed_env() -> (TempDir, Storage, Environment, TemplateContext) {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path()).unwrap();
        write_repos(layout.repos_dir());
        let catalog = Catalog::load(&layout).unwrap();
        let storage = Storage::new(layout.environments_dir()).unwrap();
        let mut env = storage.create("t1").unwrap();
        let id: ModuleId = "example-repo/c1:0.1.0".parse().unwrap();
        install_module(&catalog, &storage, &FakeRuntime::default(), &mut env, &id).unwrap();
        let ctx = TemplateContext {
            config: Default::default(),
            environment: env.template_values(),
        };
        (dir, storage, env, ctx)
    }

    #[test]
    fn run_builds_mounts_and_renders_templates() {
        let (_dir, storage, env, ctx) = installed_env();
        let runtime = FakeRuntime::default();

        run_command(&storage, &runtime, &env, &ctx, "c1", "version").unwrap();

        let runs = runtime.runs.borrow();
        let spec = &runs[0];
        assert_eq!(spec.image, "docker.io/hashicorp/terraform:0.12.28");
        assert_eq!(spec.command, "terraform");
        assert_eq!(spec.work_dir, "/work");
        assert_eq!(spec.args, ["version", "-json=t1"]);
        assert_eq!(spec.env["TF_ENV"], env.uuid.to_string());

        let work = storage.mounts_dir(env.uuid, "c1", "0.1.0").join("work");
        assert_eq!(spec.mounts["/work"], work);
        assert_eq!(spec.mounts["/shared"], storage.shared_dir(env.uuid));
        assert!(work.is_dir());
    }

    #[test]
    fn not_installed() {
        let (_dir, storage, env, ctx) = installed_env();
        let err = run_command(&storage, &FakeRuntime::default(), &env, &ctx, "c2", "x").unwrap_err();
        assert!(matches!(err, ExecError::NotInstalled(_)));
    }

    #[test]
    fn unknown_command() {
        let (_dir, storage, env, ctx) = installed_env();
        let err =
            run_command(&storage, &FakeRuntime::default(), &env, &ctx, "c1", "apply").unwrap_err();
        assert!(matches!(err, ExecError::UnknownCommand { .. }));
    }

    #[test]
    fn non_container_modules_are_not_runnable() {
        let (_dir, storage, mut env, ctx) = installed_env();
        env.installed[0].kind = ModuleKind::from("vm-image");

        let err = run_command(&storage, &FakeRuntime::default(), &env, &ctx, "c1", "version")
            .unwrap_err();
        assert!(matches!(err, ExecError::UnrunnableType { .. }));
    }

    #[test]
    fn container_failure_is_the_callers_failure() {
        let (_dir, storage, env, ctx) = installed_env();
        let runtime = FakeRuntime {
            exit_code: Some(3),
            ..FakeRuntime::default()
        };

        let err = run_command(&storage, &runtime, &env, &ctx, "c1", "version").unwrap_err();
        assert!(matches!(
            err,
            ExecError::Run(ContainerError::RunFailed { code: Some(3) })
        ));
        assert_eq!(runtime.runs.borrow().len(), 1);
    }
}
