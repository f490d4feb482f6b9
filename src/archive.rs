//! Export and import of whole environments as zip archives.
//!
//! An archive holds exactly one top-level directory, named by the
//! environment's UUID, mirroring `<envs>/<uuid>/`:
//!
//! ```text
//! <uuid>/config.yaml
//! <uuid>/shared/
//! <uuid>/<module>/<version>/runs/...
//! <uuid>/<module>/<version>/mounts/...
//! ```

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use ignore::WalkBuilder;
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::config::{ConfigError, GlobalConfig};
use crate::container::ContainerRuntime;
use crate::model::Environment;
use crate::storage::{MANIFEST_FILE, Storage, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("environment not found: {0}")]
    EnvironmentNotFound(Uuid),

    #[error("Incorrect file path specified: {}", path.display())]
    IncorrectPath { path: PathBuf },

    #[error("bad archive {}: {reason}", path.display())]
    BadArchive { path: PathBuf, reason: String },

    #[error("archive {} has no environment identity", path.display())]
    MissingIdentity { path: PathBuf },

    #[error("environment {0} is already present")]
    AlreadyPresent(Uuid),

    #[error("imported environment {id}, but pre-pulling images failed: {source}")]
    Warm { id: Uuid, source: StorageError },

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("failed to walk environment directory: {0}")]
    Walk(#[from] ignore::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = core::result::Result<T, ArchiveError>;

/// Writes `<dest_dir>/<id>.zip` holding the environment's directory tree.
pub fn export(storage: &Storage, id: Uuid, dest_dir: &Path) -> Result<PathBuf> {
    match storage.get(id) {
        Ok(_) => {}
        Err(StorageError::NotFound(_)) => return Err(ArchiveError::EnvironmentNotFound(id)),
        Err(e) => return Err(e.into()),
    }

    let dest = dest_dir.join(format!("{id}.zip"));
    let file = File::create(&dest)?;
    if let Err(e) = write_archive(storage, id, file) {
        let _ = fs::remove_file(&dest);
        return Err(e);
    }
    tracing::debug!(environment = %id, archive = %dest.display(), "exported");
    Ok(dest)
}

fn write_archive(storage: &Storage, id: Uuid, file: File) -> Result<()> {
    let mut zip = ZipWriter::new(file);

    let walk = WalkBuilder::new(storage.environment_dir(id))
        .standard_filters(false)
        .sort_by_file_name(Ord::cmp)
        .build();

    for entry in walk {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(storage.root())
            .map_err(io::Error::other)?;
        let name = archive_name(relative);
        let metadata = entry.metadata()?;
        let options = SimpleFileOptions::default().unix_permissions(permissions(&metadata));

        match entry.file_type() {
            Some(t) if t.is_dir() => zip.add_directory(format!("{name}/"), options)?,
            Some(t) if t.is_file() => {
                if name.ends_with(".tmp") {
                    continue;
                }
                zip.start_file(name, options.compression_method(CompressionMethod::Deflated))?;
                io::copy(&mut File::open(entry.path())?, &mut zip)?;
            }
            _ => tracing::warn!(path = %entry.path().display(), "not exporting special file"),
        }
    }

    zip.finish()?;
    Ok(())
}

/// Mode bits of the entry on disk.
#[cfg(unix)]
fn permissions(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permissions(metadata: &fs::Metadata) -> u32 {
    match (metadata.is_dir(), metadata.permissions().readonly()) {
        (true, _) => 0o755,
        (false, true) => 0o444,
        (false, false) => 0o644,
    }
}

/// `/`-separated archive path for a path relative to the environments root.
fn archive_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Unpacks an exported environment, selects it, and pre-pulls its images.
pub fn import(
    storage: &Storage,
    runtime: &dyn ContainerRuntime,
    config: &mut GlobalConfig,
    config_path: &Path,
    archive_path: &Path,
) -> Result<Environment> {
    if !archive_path.is_file() {
        return Err(ArchiveError::IncorrectPath {
            path: archive_path.to_path_buf(),
        });
    }
    let bad = |reason: String| ArchiveError::BadArchive {
        path: archive_path.to_path_buf(),
        reason,
    };

    let mut archive = ZipArchive::new(File::open(archive_path)?).map_err(|e| bad(e.to_string()))?;
    let env = read_manifest(&mut archive, archive_path)?;

    if storage.exists(env.uuid) {
        return Err(ArchiveError::AlreadyPresent(env.uuid));
    }
    if let Err(e) = archive.extract(storage.root()) {
        let _ = fs::remove_dir_all(storage.environment_dir(env.uuid));
        return Err(e.into());
    }
    tracing::debug!(environment = %env.uuid, "unpacked archive");

    config.select_environment(storage, env.uuid, config_path)?;

    for module in &env.installed {
        storage
            .pull_image(&env, module, runtime)
            .map_err(|source| ArchiveError::Warm {
                id: env.uuid,
                source,
            })?;
    }

    Ok(env)
}

/// Checks every entry's path and decodes the manifest, without extracting.
fn read_manifest<R: Read + io::Seek>(
    archive: &mut ZipArchive<R>,
    archive_path: &Path,
) -> Result<Environment> {
    let bad = |reason: String| ArchiveError::BadArchive {
        path: archive_path.to_path_buf(),
        reason,
    };

    let mut tops = BTreeSet::new();
    let mut manifest = None;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| bad(e.to_string()))?;
        let path = entry
            .enclosed_name()
            .ok_or_else(|| bad(format!("unsafe entry path {:?}", entry.name())))?;
        let components: Vec<_> = path
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        let Some(top) = components.first() else {
            continue;
        };
        tops.insert(top.clone());

        if components.len() == 2 && components[1] == MANIFEST_FILE && !entry.is_dir() {
            let mut yaml = String::new();
            entry
                .read_to_string(&mut yaml)
                .map_err(|e| bad(format!("unreadable manifest: {e}")))?;
            manifest = Some((top.clone(), yaml));
        }
    }

    if tops.len() > 1 {
        return Err(bad(format!(
            "expected one top-level directory, found {}",
            tops.len()
        )));
    }
    let (top, yaml) = manifest.ok_or_else(|| bad(format!("no {MANIFEST_FILE} found")))?;
    let env: Environment =
        serde_yaml::from_str(&yaml).map_err(|e| bad(format!("corrupt manifest: {e}")))?;

    if env.uuid.is_nil() {
        return Err(ArchiveError::MissingIdentity {
            path: archive_path.to_path_buf(),
        });
    }
    if top != env.uuid.to_string() {
        return Err(bad(format!(
            "directory {top} does not match environment id {}",
            env.uuid
        )));
    }
    Ok(env)
}
