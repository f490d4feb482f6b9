//! Installation pipeline: catalog module version → environment.

use crate::catalog::{Catalog, CatalogError, ModuleId};
use crate::container::ContainerRuntime;
use crate::model::{Environment, InstalledModule};
use crate::storage::{Storage, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("unknown module {0}")]
    UnknownModule(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Resolves `id` in the catalog and installs it into `env`.
///
/// Returns the installed record.
pub fn install_module(
    catalog: &Catalog,
    storage: &Storage,
    runtime: &dyn ContainerRuntime,
    env: &mut Environment,
    id: &ModuleId,
) -> Result<InstalledModule, InstallError> {
    let resolved = catalog
        .get_module(
            &id.repository,
            &id.module,
            id.version.as_deref().unwrap_or_default(),
        )
        .map_err(|e| match e {
            CatalogError::NotFound(key) => InstallError::UnknownModule(key),
            other => other.into(),
        })?;

    let record = resolved.to_installed(env.uuid);
    tracing::debug!(
        module = %record.name,
        version = %record.version,
        environment = %env.uuid,
        "installing"
    );
    storage.install(env, record.clone(), runtime)?;
    Ok(record)
}
