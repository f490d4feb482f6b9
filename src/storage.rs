//! Local persistence for environments.
//!
//! Each environment lives in its own directory under the environments root:
//!
//! ```text
//! <envs>/<uuid>/
//!   config.yaml                   # Environment manifest
//!   shared/                       # bind-mounted into modules that declare `shared`
//!   <module>/<version>/runs/      # pull logs
//!   <module>/<version>/mounts/    # bind-mount backing directories
//! <envs>/<uuid>.lock              # advisory lock held while writing the manifest
//! ```

mod install;
mod lock;

use std::path::{Path, PathBuf};
use std::{fs, io};

use uuid::Uuid;

use crate::container::ContainerError;
use crate::layout::{LayoutError, ensure_directory};
use crate::model::Environment;

/// File name of an environment's manifest.
pub const MANIFEST_FILE: &str = "config.yaml";

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("environment not found: {0}")]
    NotFound(Uuid),

    #[error("environment already exists: {0}")]
    AlreadyExists(Uuid),

    #[error("corrupt manifest at {}: {source}", path.display())]
    CorruptManifest {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("refusing to save an environment without an identity")]
    InvalidIdentity,

    #[error("module {name}:{version} is already installed")]
    AlreadyInstalled { name: String, version: String },

    #[error("failed to pull image {image}: {source}")]
    Pull {
        image: String,
        source: ContainerError,
    },

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = core::result::Result<T, StorageError>;

/// Local file-based storage for environments.
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Creates a new storage instance rooted at the given directory.
    ///
    /// The directory is created if it doesn't exist.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        ensure_directory(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates a new environment with a fresh identity and an empty manifest.
    pub fn create(&self, name: &str) -> Result<Environment> {
        let env = Environment::new(name);
        let dir = self.environment_dir(env.uuid);
        if dir.exists() {
            return Err(StorageError::AlreadyExists(env.uuid));
        }
        ensure_directory(&dir)?;
        ensure_directory(&self.shared_dir(env.uuid))?;
        self.write_manifest(&env)?;
        tracing::debug!(uuid = %env.uuid, name, "created environment");
        Ok(env)
    }

    /// Loads a single environment's manifest.
    pub fn get(&self, id: Uuid) -> Result<Environment> {
        let path = self.manifest_path(id);
        let yaml = match fs::read_to_string(&path) {
            Ok(yaml) => yaml,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(id));
            }
            Err(e) => return Err(e.into()),
        };
        serde_yaml::from_str(&yaml).map_err(|source| StorageError::CorruptManifest { path, source })
    }

    /// Lists every environment whose directory and manifest are valid.
    ///
    /// Entries that are not UUID-named directories, or whose manifest can't be
    /// read, are logged and skipped. Order follows the directory listing.
    pub fn get_all(&self) -> Result<Vec<Environment>> {
        let mut environments = Vec::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(environments),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(id) = name.to_str().and_then(|n| Uuid::parse_str(n).ok()) else {
                tracing::warn!(dir = %entry.path().display(), "skipping directory: not an environment id");
                continue;
            };
            match self.get(id) {
                Ok(env) if env.uuid == id => environments.push(env),
                Ok(env) => tracing::warn!(
                    dir = %entry.path().display(),
                    manifest = %env.uuid,
                    "skipping environment: manifest identity does not match its directory"
                ),
                Err(e) => tracing::warn!(dir = %entry.path().display(), "skipping environment: {e}"),
            }
        }
        Ok(environments)
    }

    /// Overwrites an environment's manifest.
    pub fn save(&self, env: &Environment) -> Result<()> {
        if env.uuid.is_nil() {
            return Err(StorageError::InvalidIdentity);
        }
        let _lock = self.lock(env.uuid)?;
        self.write_manifest(env)
    }

    /// Applies `change` to the manifest as it is on disk, under the lock.
    ///
    /// Returns the updated environment.
    pub fn update(&self, id: Uuid, change: impl FnOnce(&mut Environment)) -> Result<Environment> {
        if id.is_nil() {
            return Err(StorageError::InvalidIdentity);
        }
        let _lock = self.lock(id)?;
        let mut env = self.get(id)?;
        change(&mut env);
        self.write_manifest(&env)?;
        Ok(env)
    }

    /// Whether an environment directory exists, manifest or not.
    pub fn exists(&self, id: Uuid) -> bool {
        self.environment_dir(id).exists()
    }

    pub fn environment_dir(&self, id: Uuid) -> PathBuf {
        self.root.join(id.to_string())
    }

    pub fn manifest_path(&self, id: Uuid) -> PathBuf {
        self.environment_dir(id).join(MANIFEST_FILE)
    }

    pub fn shared_dir(&self, id: Uuid) -> PathBuf {
        self.environment_dir(id).join("shared")
    }

    pub fn module_dir(&self, id: Uuid, module: &str, version: &str) -> PathBuf {
        self.environment_dir(id).join(module).join(version)
    }

    pub fn runs_dir(&self, id: Uuid, module: &str, version: &str) -> PathBuf {
        self.module_dir(id, module, version).join("runs")
    }

    pub fn mounts_dir(&self, id: Uuid, module: &str, version: &str) -> PathBuf {
        self.module_dir(id, module, version).join("mounts")
    }

    /// Writes the manifest via a temp file and rename. Callers hold the lock.
    fn write_manifest(&self, env: &Environment) -> Result<()> {
        let dir = self.environment_dir(env.uuid);
        if !dir.is_dir() {
            return Err(StorageError::NotFound(env.uuid));
        }
        let yaml = serde_yaml::to_string(env)?;
        let tmp = dir.join(format!("{MANIFEST_FILE}.tmp"));
        fs::write(&tmp, yaml)?;
        fs::rename(&tmp, dir.join(MANIFEST_FILE))?;
        Ok(())
    }
}
