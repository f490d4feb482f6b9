//! Catalog store: the module repositories installed under `<root>/repos/`.
//!
//! The files on disk are the source of truth. A [`Catalog`] is a snapshot
//! read fresh for each command; edits made between commands show up on the
//! next load.

pub mod remote;

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{fs, io};

use crate::layout::Layout;
use crate::model::{CatalogRepository, ResolvedModule};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to load catalog {}: {source}", path.display())]
    LoadFailure {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("failed to read catalog {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("module not found: {0}")]
    NotFound(String),

    #[error("no version of {0} is marked latest")]
    NoLatest(String),

    #[error("more than one version of {0} is marked latest")]
    MultipleLatest(String),

    #[error("invalid specifier {spec:?}: {reason}")]
    BadSpec { spec: String, reason: String },

    #[error("repository already installed at {} (use --force to replace it)", path.display())]
    AlreadyInstalled { path: PathBuf },

    #[error("repository {name:?} is already declared by {}", path.display())]
    NameInUse { name: String, path: PathBuf },

    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("invalid catalog from {url}: {reason}")]
    Invalid { url: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = core::result::Result<T, CatalogError>;

/// All repositories currently installed.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    repositories: Vec<CatalogRepository>,
}

impl Catalog {
    /// Reads every catalog under the layout's repos directory, plus the
    /// default index file when one is present.
    pub fn load(layout: &Layout) -> Result<Self> {
        let mut catalog = Self::default();
        for path in catalog_files(layout)? {
            catalog.add(&path, read_repository(&path)?);
        }
        Ok(catalog)
    }

    /// Reads every `.yaml`/`.yml` file directly inside `dir`, in name order.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut catalog = Self::default();
        for path in files_in(dir)? {
            catalog.add(&path, read_repository(&path)?);
        }
        Ok(catalog)
    }

    /// Repository names are unique; the first file to declare one wins.
    fn add(&mut self, path: &Path, repository: CatalogRepository) {
        if self.repositories.iter().any(|r| r.name == repository.name) {
            tracing::warn!(
                path = %path.display(),
                repository = %repository.name,
                "skipping catalog: repository name is already in use"
            );
            return;
        }
        self.repositories.push(repository);
    }

    pub fn repositories(&self) -> &[CatalogRepository] {
        &self.repositories
    }

    /// One ``Module: `<name>:<version>` `` line per module version.
    pub fn list(&self) -> String {
        let mut out = String::new();
        for repo in &self.repositories {
            for component in &repo.components {
                for version in &component.versions {
                    out.push_str(&format!(
                        "Module: `{}:{}`\n",
                        component.name, version.version
                    ));
                }
            }
        }
        out
    }

    /// Resolve a module version. An empty `version` selects the one marked latest.
    pub fn get_module(&self, repo: &str, module: &str, version: &str) -> Result<ResolvedModule> {
        let id = ModuleId {
            repository: repo.to_string(),
            module: module.to_string(),
            version: (!version.is_empty()).then(|| version.to_string()),
        };
        let not_found = || CatalogError::NotFound(id.to_string());

        let repository = self
            .repositories
            .iter()
            .find(|r| r.name == repo)
            .ok_or_else(not_found)?;
        let component = repository
            .components
            .iter()
            .find(|c| c.name == module)
            .ok_or_else(not_found)?;

        let found = if version.is_empty() {
            let mut latest = component.versions.iter().filter(|v| v.latest);
            match (latest.next(), latest.next()) {
                (Some(v), None) => v,
                (None, _) => return Err(CatalogError::NoLatest(id.to_string())),
                (Some(_), Some(_)) => return Err(CatalogError::MultipleLatest(id.to_string())),
            }
        } else {
            component
                .versions
                .iter()
                .find(|v| v.version == version)
                .ok_or_else(not_found)?
        };

        Ok(ResolvedModule {
            repository: repository.name.clone(),
            name: component.name.clone(),
            kind: component.kind.clone(),
            version: found.clone(),
        })
    }

    /// Every `<repo>/<module>:<version>` key containing `needle`, sorted, once each.
    pub fn search(&self, needle: &str) -> Vec<String> {
        let keys: BTreeSet<String> = self
            .repositories
            .iter()
            .flat_map(|repo| {
                repo.components.iter().flat_map(move |component| {
                    component.versions.iter().map(move |version| {
                        format!("{}/{}:{}", repo.name, component.name, version.version)
                    })
                })
            })
            .filter(|key| key.contains(needle))
            .collect();
        keys.into_iter().collect()
    }
}

/// A module reference: `<repo>/<module>` or `<repo>/<module>:<version>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleId {
    pub repository: String,
    pub module: String,
    pub version: Option<String>,
}

impl FromStr for ModuleId {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        let bad = |reason: &str| CatalogError::BadSpec {
            spec: s.to_string(),
            reason: reason.to_string(),
        };

        let (path, version) = match s.split_once(':') {
            Some((_, "")) => return Err(bad("empty version")),
            Some((path, version)) => (path, Some(version.to_string())),
            None => (s, None),
        };
        let (repository, module) = path
            .split_once('/')
            .ok_or_else(|| bad("expected <repo>/<module>[:<version>]"))?;
        if repository.is_empty() || module.is_empty() || module.contains('/') {
            return Err(bad("expected <repo>/<module>[:<version>]"));
        }

        Ok(Self {
            repository: repository.to_string(),
            module: module.to_string(),
            version,
        })
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.repository, self.module)?;
        if let Some(version) = &self.version {
            write!(f, ":{version}")?;
        }
        Ok(())
    }
}

fn is_catalog_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    )
}

/// Catalog files in load order: the repos directory, then the default index.
fn catalog_files(layout: &Layout) -> Result<Vec<PathBuf>> {
    let mut paths = files_in(layout.repos_dir())?;
    let index = layout.repository_index_file();
    if index.is_file() {
        paths.push(index.to_path_buf());
    }
    Ok(paths)
}

fn files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && is_catalog_file(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// The installed catalog file, other than `except`, that declares repository
/// `name`. Files that fail to load are passed over.
pub(crate) fn file_declaring(
    layout: &Layout,
    name: &str,
    except: &Path,
) -> Result<Option<PathBuf>> {
    for path in catalog_files(layout)? {
        if path == except {
            continue;
        }
        match read_repository(&path) {
            Ok(repository) if repository.name == name => return Ok(Some(path)),
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "ignoring unreadable catalog"),
        }
    }
    Ok(None)
}

fn read_repository(path: &Path) -> Result<CatalogRepository> {
    let yaml = fs::read_to_string(path).map_err(|source| CatalogError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&yaml).map_err(|source| CatalogError::LoadFailure {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use tempfile::TempDir;

    pub(crate) const EXAMPLE_REPO: &str = r##"
version: v1
kind: Repository
name: example-repo
components:
  - name: c1
    type: container
    versions:
      - version: 0.1.0
        latest: true
        image: docker.io/hashicorp/terraform:0.12.28
        workdir: /work
        mounts: [/work]
        shared: /shared
        commands:
          - name: version
            description: Print the version
            command: terraform
            args: [version, "-json=#Environment#{{ .Name }}"]
            envs:
              TF_ENV: "#Environment#{{ .UUID }}"
      - version: 0.2.0
        image: docker.io/hashicorp/terraform:0.13.0
  - name: c2
    type: container
    versions:
      - version: 1.0.0
        image: alpine:3
      - version: 1.1.0
        image: alpine:3
"##;

    const OTHER_REPO: &str = r#"
version: v1
kind: Repository
name: other
components:
  - name: c1
    type: container
    versions:
      - version: 0.1.0
        latest: true
        image: busybox:1
      - version: 0.3.0
        latest: true
        image: busybox:2
"#;

    pub(crate) fn write_repos(dir: &Path) {
        fs::write(dir.join("example-repo.yaml"), EXAMPLE_REPO).unwrap();
        fs::write(dir.join("other.yml"), OTHER_REPO).unwrap();
    }

    fn test_catalog() -> (TempDir, Catalog) {
        let dir = TempDir::new().unwrap();
        write_repos(dir.path());
        let catalog = Catalog::load_dir(dir.path()).unwrap();
        (dir, catalog)
    }

    #[test]
    fn load_reads_yaml_and_yml_only() {
        let dir = TempDir::new().unwrap();
        write_repos(dir.path());
        fs::write(dir.path().join("README.md"), "not a catalog").unwrap();
        fs::create_dir(dir.path().join("nested.yaml")).unwrap();

        let catalog = Catalog::load_dir(dir.path()).unwrap();

        let names: Vec<_> = catalog.repositories().iter().map(|r| &r.name).collect();
        assert_eq!(names, ["example-repo", "other"]);
    }

    #[test]
    fn load_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::load_dir(&dir.path().join("nope")).unwrap();
        assert!(catalog.repositories().is_empty());
    }

    #[test]
    fn load_fails_on_undecodable_file() {
        let dir = TempDir::new().unwrap();
        write_repos(dir.path());
        fs::write(dir.path().join("broken.yaml"), "components: {").unwrap();

        let err = Catalog::load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, CatalogError::LoadFailure { path, .. } if path.ends_with("broken.yaml")));
    }

    #[test]
    fn load_includes_default_index() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path()).unwrap();
        fs::write(layout.repos_dir().join("example-repo.yaml"), EXAMPLE_REPO).unwrap();
        fs::write(layout.repository_index_file(), OTHER_REPO).unwrap();

        let catalog = Catalog::load(&layout).unwrap();
        assert_eq!(catalog.repositories().len(), 2);
    }

    #[test]
    fn load_keeps_first_repository_of_a_name() {
        let dir = TempDir::new().unwrap();
        write_repos(dir.path());
        fs::write(
            dir.path().join("zz-copy.yaml"),
            OTHER_REPO.replace("name: other", "name: example-repo"),
        )
        .unwrap();

        let catalog = Catalog::load_dir(dir.path()).unwrap();

        let names: Vec<_> = catalog.repositories().iter().map(|r| &r.name).collect();
        assert_eq!(names, ["example-repo", "other"]);
        let module = catalog.get_module("example-repo", "c1", "0.2.0").unwrap();
        assert_eq!(module.version.version, "0.2.0");
    }

    #[test]
    fn default_index_does_not_shadow_installed_repository() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path()).unwrap();
        fs::write(layout.repos_dir().join("other.yaml"), OTHER_REPO).unwrap();
        fs::write(
            layout.repository_index_file(),
            EXAMPLE_REPO.replace("name: example-repo", "name: other"),
        )
        .unwrap();

        let catalog = Catalog::load(&layout).unwrap();

        assert_eq!(catalog.repositories().len(), 1);
        assert!(catalog.get_module("other", "c2", "").is_err());
    }

    #[test]
    fn file_declaring_finds_other_files_only() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path()).unwrap();
        write_repos(layout.repos_dir());
        fs::write(layout.repos_dir().join("broken.yaml"), "components: {").unwrap();
        let own = layout.repos_dir().join("other.yml");

        let found = file_declaring(&layout, "other", Path::new("/nowhere")).unwrap();
        assert_eq!(found.as_deref(), Some(own.as_path()));
        assert_eq!(file_declaring(&layout, "other", &own).unwrap(), None);
        assert_eq!(file_declaring(&layout, "missing", &own).unwrap(), None);
    }

    #[test]
    fn list_names_every_module_version() {
        let (_dir, catalog) = test_catalog();
        let listing = catalog.list();

        assert!(listing.contains("Module: `c1:0.1.0`\n"));
        assert!(listing.contains("Module: `c1:0.2.0`\n"));
        assert!(listing.contains("Module: `c2:1.1.0`\n"));
        assert_eq!(listing.lines().count(), 6);
    }

    #[test]
    fn get_module_by_version() {
        let (_dir, catalog) = test_catalog();
        let module = catalog.get_module("example-repo", "c1", "0.2.0").unwrap();

        assert_eq!(module.repository, "example-repo");
        assert_eq!(module.name, "c1");
        assert_eq!(module.version.image, "docker.io/hashicorp/terraform:0.13.0");
    }

    #[test]
    fn get_module_latest() {
        let (_dir, catalog) = test_catalog();
        let module = catalog.get_module("example-repo", "c1", "").unwrap();
        assert_eq!(module.version.version, "0.1.0");
    }

    #[test]
    fn get_module_latest_errors() {
        let (_dir, catalog) = test_catalog();

        let err = catalog.get_module("example-repo", "c2", "").unwrap_err();
        assert!(matches!(err, CatalogError::NoLatest(_)));

        let err = catalog.get_module("other", "c1", "").unwrap_err();
        assert!(matches!(err, CatalogError::MultipleLatest(_)));
    }

    #[test]
    fn get_module_not_found() {
        let (_dir, catalog) = test_catalog();
        for (repo, module, version) in [
            ("nope", "c1", "0.1.0"),
            ("example-repo", "nope", "0.1.0"),
            ("example-repo", "c1", "9.9.9"),
        ] {
            let err = catalog.get_module(repo, module, version).unwrap_err();
            assert!(matches!(err, CatalogError::NotFound(_)), "{repo}/{module}:{version}");
        }
    }

    #[test]
    fn search_empty_returns_every_key_once() {
        let (_dir, catalog) = test_catalog();
        let all = catalog.search("");

        assert_eq!(
            all,
            [
                "example-repo/c1:0.1.0",
                "example-repo/c1:0.2.0",
                "example-repo/c2:1.0.0",
                "example-repo/c2:1.1.0",
                "other/c1:0.1.0",
                "other/c1:0.3.0",
            ]
        );
    }

    #[test]
    fn search_narrows_as_the_needle_grows() {
        let (_dir, catalog) = test_catalog();
        let needles = ["", "c", "c1", "c1:", "c1:0.", "c1:0.1", "c1:0.1.0"];

        for pair in needles.windows(2) {
            let wide = catalog.search(pair[0]);
            let narrow = catalog.search(pair[1]);
            assert!(narrow.iter().all(|k| wide.contains(k)), "{pair:?}");
        }
        assert_eq!(
            catalog.search("c1:0.1.0"),
            ["example-repo/c1:0.1.0", "other/c1:0.1.0"]
        );
    }

    #[test]
    fn search_is_case_sensitive() {
        let (_dir, catalog) = test_catalog();
        assert!(catalog.search("C1").is_empty());
        assert!(catalog.search("zzz").is_empty());
    }

    #[test]
    fn module_id_parses() {
        let id: ModuleId = "example-repo/c1:0.1.0".parse().unwrap();
        assert_eq!(id.repository, "example-repo");
        assert_eq!(id.module, "c1");
        assert_eq!(id.version.as_deref(), Some("0.1.0"));
        assert_eq!(id.to_string(), "example-repo/c1:0.1.0");

        let id: ModuleId = "example-repo/c1".parse().unwrap();
        assert_eq!(id.version, None);
    }

    #[test]
    fn module_id_rejects_malformed() {
        for s in ["c1", "/c1", "repo/", "repo/c1:", "a/b/c:1"] {
            let err = s.parse::<ModuleId>().unwrap_err();
            assert!(matches!(err, CatalogError::BadSpec { .. }), "{s}");
        }
    }
}
