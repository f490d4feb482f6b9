//! Installing a module record into an environment.
//!
//! Directories first, then the image, then the manifest. The manifest write
//! is the commit point; a failure before it leaves harmless directories and
//! logs behind, and a retry picks up where the last attempt stopped.

use std::fs;
use std::path::PathBuf;

use jiff::Zoned;
use jiff::fmt::strtime;

use crate::container::ContainerRuntime;
use crate::layout::ensure_directory;
use crate::model::{Environment, InstalledModule};

use super::{Result, Storage, StorageError};

impl Storage {
    /// Installs `module` into `env`.
    ///
    /// `env` is refreshed from disk under the environment lock before the
    /// duplicate check, so installs committed by other invocations are kept.
    pub fn install(
        &self,
        env: &mut Environment,
        module: InstalledModule,
        runtime: &dyn ContainerRuntime,
    ) -> Result<()> {
        if env.uuid.is_nil() {
            return Err(StorageError::InvalidIdentity);
        }
        let _lock = self.lock(env.uuid)?;
        *env = self.get(env.uuid)?;

        if env.has_installed(&module.name, &module.version) {
            return Err(StorageError::AlreadyInstalled {
                name: module.name,
                version: module.version,
            });
        }

        ensure_directory(&self.runs_dir(env.uuid, &module.name, &module.version))?;
        ensure_directory(&self.mounts_dir(env.uuid, &module.name, &module.version))?;

        self.fetch_image(env, &module, runtime)?;

        env.installed.push(module);
        self.write_manifest(env)
    }

    /// Pulls the module's image unless it is already present locally.
    pub fn fetch_image(
        &self,
        env: &Environment,
        module: &InstalledModule,
        runtime: &dyn ContainerRuntime,
    ) -> Result<()> {
        if runtime.image_present(&module.image)? {
            tracing::debug!(image = %module.image, "image already present");
            return Ok(());
        }
        self.pull_image(env, module, runtime)
    }

    /// Pulls the module's image and persists the pull log, whatever the outcome.
    pub fn pull_image(
        &self,
        env: &Environment,
        module: &InstalledModule,
        runtime: &dyn ContainerRuntime,
    ) -> Result<()> {
        let (log, outcome) = match runtime.pull(&module.image) {
            Ok(log) => (log, Ok(())),
            Err(failure) => (failure.log, Err(failure.error)),
        };
        let path = self.write_run_log(env, module, &log)?;
        tracing::debug!(image = %module.image, log = %path.display(), "pull log written");

        outcome.map_err(|source| StorageError::Pull {
            image: module.image.clone(),
            source,
        })
    }

    fn write_run_log(
        &self,
        env: &Environment,
        module: &InstalledModule,
        log: &str,
    ) -> Result<PathBuf> {
        let runs = self.runs_dir(env.uuid, &module.name, &module.version);
        ensure_directory(&runs)?;
        let path = runs.join(format!("{}.log", run_log_stamp(&Zoned::now())?));
        fs::write(&path, log)?;
        Ok(path)
    }
}

/// `YYYYMMDD-HHMMSS.mmmTZ`, e.g. `20261016-093015.042UTC`.
fn run_log_stamp(now: &Zoned) -> Result<String> {
    let format = |f: &str| strtime::format(f, now).map_err(std::io::Error::other);
    let millis = now.subsec_nanosecond() / 1_000_000;
    Ok(format!(
        "{}.{millis:03}{}",
        format("%Y%m%d-%H%M%S")?,
        format("%Z")?
    ))
}
