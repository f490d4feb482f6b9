//! On-disk layout of the harbor root.
//!
//! ```text
//! <root>/
//!   config.yaml          # global configuration
//!   v1.yaml              # optional default catalog index
//!   repos/<key>.yaml     # installed catalog repositories
//!   environments/<uuid>/ # one directory per environment
//!   tmp/                 # scratch space
//! ```
//!
//! A [`Layout`] is resolved once at startup and passed to every store.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::{fs, io};

/// Mode applied to every directory the layout creates.
const DIR_MODE: u32 = 0o755;

/// Environment variable overriding the default root.
pub const ROOT_ENV: &str = "HARBOR_HOME";

#[derive(Debug, thiserror::Error)]
#[error("failed to create directory {}: {source}", path.display())]
pub struct LayoutError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Resolved locations under the harbor root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
    config_file: PathBuf,
    environments_dir: PathBuf,
    temp_dir: PathBuf,
    repos_dir: PathBuf,
    repository_index_file: PathBuf,
}

static LAYOUT: OnceLock<Layout> = OnceLock::new();

/// Initializes the process-wide layout.
///
/// The first successful call wins. Later calls return the existing layout,
/// even when they name a different root.
pub fn initialize(root: impl Into<PathBuf>) -> Result<&'static Layout, LayoutError> {
    let root = root.into();
    if let Some(existing) = LAYOUT.get() {
        if existing.root != root {
            tracing::warn!(
                requested = %root.display(),
                current = %existing.root.display(),
                "layout already initialized, keeping the first root"
            );
        }
        return Ok(existing);
    }
    let layout = Layout::new(root)?;
    Ok(LAYOUT.get_or_init(|| layout))
}

impl Layout {
    /// Resolves the canonical paths under `root` and creates the directories.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, LayoutError> {
        let root = root.into();
        let layout = Self {
            config_file: root.join("config.yaml"),
            environments_dir: root.join("environments"),
            temp_dir: root.join("tmp"),
            repos_dir: root.join("repos"),
            repository_index_file: root.join("v1.yaml"),
            root,
        };
        for dir in [
            &layout.root,
            &layout.environments_dir,
            &layout.temp_dir,
            &layout.repos_dir,
        ] {
            ensure_directory(dir)?;
        }
        Ok(layout)
    }

    /// Returns the default root: `$HARBOR_HOME`, else `~/.harbor/`.
    pub fn default_root() -> Option<PathBuf> {
        if let Ok(root) = std::env::var(ROOT_ENV)
            && !root.is_empty()
        {
            return Some(PathBuf::from(root));
        }
        dirs::home_dir().map(|h| h.join(".harbor"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    pub fn environments_dir(&self) -> &Path {
        &self.environments_dir
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    pub fn repos_dir(&self) -> &Path {
        &self.repos_dir
    }

    pub fn repository_index_file(&self) -> &Path {
        &self.repository_index_file
    }
}

/// Creates `path` and all of its parents.
pub fn ensure_directory(path: &Path) -> Result<(), LayoutError> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }
    builder.create(path).map_err(|source| LayoutError {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    #[test]
    fn new_creates_directories() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path().join("root")).unwrap();

        assert!(layout.environments_dir().is_dir());
        assert!(layout.temp_dir().is_dir());
        assert!(layout.repos_dir().is_dir());
        assert_eq!(layout.config_file(), dir.path().join("root/config.yaml"));
        assert_eq!(
            layout.repository_index_file(),
            dir.path().join("root/v1.yaml")
        );
    }

    #[test]
    fn new_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let first = Layout::new(dir.path()).unwrap();
        let second = Layout::new(dir.path()).unwrap();

        assert_eq!(first, second);
    }

    #[cfg(unix)]
    #[test]
    fn directories_use_mode_0755() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/c");
        ensure_directory(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        // The process umask may only clear bits.
        assert_eq!(mode & !DIR_MODE, 0);
    }

    #[test]
    fn ensure_directory_fails_under_a_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file");
        fs::write(&file, "x").unwrap();

        let err = ensure_directory(&file.join("child")).unwrap_err();
        assert_eq!(err.path, file.join("child"));
    }

    #[test]
    fn initialize_keeps_first_root() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();

        let a = initialize(first.path()).unwrap();
        let b = initialize(second.path()).unwrap();

        assert_eq!(a.root(), b.root());
    }
}
