//! Installing catalog repositories from remote sources.
//!
//! Two specifier formats are accepted:
//! - `<user>/<repo>`: a GitHub repository, shallow-cloned
//! - `https://host/<user>/<repo>[...]`: cloned, or fetched directly when the
//!   URL points at a `.yaml`/`.yml` file
//!
//! The fetched catalog is validated, written under the scratch directory and
//! renamed into `<repos>/<user>-<repo>.yaml`.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::layout::Layout;
use crate::model::{CatalogRepository, REPOSITORY_KIND};

use super::{CatalogError, Result};

/// Index files looked up, in order, at the root of a cloned repository.
const INDEX_FILES: [&str; 2] = ["v1.yaml", "index.yaml"];

const GIT_CLONE_TIMEOUT: Duration = Duration::from_secs(300);
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_INDEX_SIZE: u64 = 10 * 1024 * 1024;

/// A parsed remote repository specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSpec {
    /// Where to fetch from.
    pub url: String,
    /// `<user>-<repo>`: the local file stem.
    pub key: String,
    /// Whether `url` names the catalog file itself rather than a git repository.
    pub direct: bool,
}

impl RemoteSpec {
    pub fn parse(spec: &str) -> Result<Self> {
        let bad = |reason: &str| CatalogError::BadSpec {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };

        if let Some(rest) = spec.strip_prefix("https://") {
            let (host, path) = rest
                .split_once('/')
                .ok_or_else(|| bad("URL has no repository path"))?;
            if host.is_empty() {
                return Err(bad("URL has no host"));
            }
            let mut parts = path.split('/').filter(|p| !p.is_empty());
            let (Some(user), Some(repo)) = (parts.next(), parts.next()) else {
                return Err(bad("expected https://<host>/<user>/<repo>"));
            };
            let repo = repo.trim_end_matches(".git");
            validate_component(user).map_err(|r| bad(&r))?;
            validate_component(repo).map_err(|r| bad(&r))?;

            let direct = Path::new(path)
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "yaml" || e == "yml");
            return Ok(Self {
                url: spec.to_string(),
                key: format!("{user}-{repo}"),
                direct,
            });
        }

        if spec.contains("://") {
            return Err(bad("only https:// URLs are supported"));
        }
        let (user, repo) = spec
            .split_once('/')
            .ok_or_else(|| bad("expected <user>/<repo> or an https:// URL"))?;
        let repo = repo.trim_end_matches(".git");
        validate_component(user).map_err(|r| bad(&r))?;
        validate_component(repo).map_err(|r| bad(&r))?;

        Ok(Self {
            url: format!("https://github.com/{user}/{repo}.git"),
            key: format!("{user}-{repo}"),
            direct: false,
        })
    }
}

/// Fetch, validate and store a catalog repository. Returns the file written.
pub fn install(
    layout: &Layout,
    spec: &str,
    force: bool,
    branch: Option<&str>,
) -> Result<(PathBuf, CatalogRepository)> {
    let remote = RemoteSpec::parse(spec)?;
    let dest = layout.repos_dir().join(format!("{}.yaml", remote.key));
    if dest.exists() && !force {
        return Err(CatalogError::AlreadyInstalled { path: dest });
    }
    let branch = branch.filter(|b| !b.is_empty());
    if let Some(b) = branch {
        validate_branch(b).map_err(|reason| CatalogError::BadSpec {
            spec: b.to_string(),
            reason,
        })?;
    }

    let bytes = if remote.direct {
        if branch.is_some() {
            tracing::debug!(url = %remote.url, "ignoring branch for a direct catalog URL");
        }
        fetch_file(&remote.url)?
    } else {
        fetch_from_clone(layout.temp_dir(), &remote.url, branch)?
    };

    let repository = store(layout, &remote.url, &bytes, &dest)?;
    Ok((dest, repository))
}

/// Validate fetched bytes and write them to `dest`. A repository name
/// declared by any other installed catalog file is refused, even with
/// `--force`, which only replaces `dest` itself.
fn store(layout: &Layout, url: &str, bytes: &[u8], dest: &Path) -> Result<CatalogRepository> {
    let repository = validate(url, bytes)?;
    if let Some(path) = super::file_declaring(layout, &repository.name, dest)? {
        return Err(CatalogError::NameInUse {
            name: repository.name,
            path,
        });
    }

    let mut tmp = tempfile::Builder::new()
        .prefix("catalog-")
        .suffix(".yaml.tmp")
        .tempfile_in(layout.temp_dir())?;
    tmp.write_all(bytes)?;
    tmp.persist(dest).map_err(|e| e.error)?;

    tracing::debug!(path = %dest.display(), repository = %repository.name, "installed catalog");
    Ok(repository)
}

/// Decode the fetched bytes and check the document is a repository.
fn validate(url: &str, bytes: &[u8]) -> Result<CatalogRepository> {
    let invalid = |reason: String| CatalogError::Invalid {
        url: url.to_string(),
        reason,
    };
    let repository: CatalogRepository =
        serde_yaml::from_slice(bytes).map_err(|e| invalid(e.to_string()))?;
    if repository.kind != REPOSITORY_KIND {
        return Err(invalid(format!(
            "expected kind {REPOSITORY_KIND:?}, found {:?}",
            repository.kind
        )));
    }
    Ok(repository)
}

fn fetch_file(url: &str) -> Result<Vec<u8>> {
    let fetch = |reason: String| CatalogError::Fetch {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("harbor/", env!("CARGO_PKG_VERSION")))
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| fetch(format!("failed to create HTTP client: {e}")))?;
    let response = client
        .get(url)
        .send()
        .map_err(|e| fetch(e.to_string()))?;

    if !response.status().is_success() {
        return Err(fetch(format!("server returned {}", response.status())));
    }
    if let Some(len) = response.content_length()
        && len > MAX_INDEX_SIZE
    {
        return Err(fetch(format!("catalog is {len} bytes, limit is {MAX_INDEX_SIZE}")));
    }

    let bytes = response.bytes().map_err(|e| fetch(e.to_string()))?;
    if bytes.len() as u64 > MAX_INDEX_SIZE {
        return Err(fetch(format!("catalog exceeds {MAX_INDEX_SIZE} bytes")));
    }
    Ok(bytes.to_vec())
}

/// Shallow-clone `url` into a scratch directory and read its index file.
fn fetch_from_clone(scratch: &Path, url: &str, branch: Option<&str>) -> Result<Vec<u8>> {
    let dir = tempfile::Builder::new()
        .prefix("clone-")
        .tempdir_in(scratch)?;
    let checkout = dir.path().join("repo");

    let mut cmd = Command::new("git");
    // Keep user and system git config (hooks, fsmonitor, proxies) out of the clone.
    cmd.env_clear();
    for var in ["PATH", "HOME"] {
        if let Ok(value) = std::env::var(var) {
            cmd.env(var, value);
        }
    }
    cmd.env("GIT_CONFIG_NOSYSTEM", "1")
        .env("GIT_CONFIG_GLOBAL", "/dev/null")
        .env("GIT_TERMINAL_PROMPT", "0")
        .args(["clone", "--quiet", "--depth=1"]);
    if let Some(b) = branch {
        cmd.args(["--branch", b]);
    }
    cmd.arg(url).arg(&checkout);

    run_with_timeout(cmd, GIT_CLONE_TIMEOUT).map_err(|reason| CatalogError::Fetch {
        url: url.to_string(),
        reason,
    })?;

    for name in INDEX_FILES {
        let path = checkout.join(name);
        if path.is_file() {
            return Ok(std::fs::read(path)?);
        }
    }
    Err(CatalogError::Fetch {
        url: url.to_string(),
        reason: format!("repository has none of {}", INDEX_FILES.join(", ")),
    })
}

/// Run a command to completion, killing it after `timeout`.
fn run_with_timeout(mut cmd: Command, timeout: Duration) -> core::result::Result<(), String> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("failed to run git: {e}"))?;
    let stderr = child.stderr.take();

    // stderr is drained while the child runs so a full pipe cannot stall it.
    let (status, stderr) = thread::scope(|s| {
        let drain = s.spawn(move || {
            let mut text = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut text);
            }
            text
        });
        let status = wait_with_timeout(&mut child, timeout);
        (status, drain.join().unwrap_or_default())
    });

    let status = status?;
    if status.success() {
        return Ok(());
    }
    Err(format!("git clone failed ({status}): {}", stderr.trim()))
}

fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
) -> core::result::Result<ExitStatus, String> {
    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if started.elapsed() >= timeout => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(format!("git clone timed out after {}s", timeout.as_secs()));
            }
            Ok(None) => thread::sleep(Duration::from_millis(100)),
            Err(e) => return Err(format!("failed to wait for git: {e}")),
        }
    }
}

/// User and repository names: ASCII alphanumerics, `-`, `_` and `.`,
/// not starting with `-` or `.`.
fn validate_component(s: &str) -> core::result::Result<(), String> {
    if s.is_empty() {
        return Err("empty user or repository name".to_string());
    }
    if s.starts_with(['-', '.']) {
        return Err(format!("{s:?} may not start with '-' or '.'"));
    }
    if let Some(c) = s
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(format!("{s:?} contains {c:?}"));
    }
    Ok(())
}

fn validate_branch(b: &str) -> core::result::Result<(), String> {
    if b.starts_with('-') || b.contains("..") || b.contains(char::is_whitespace) {
        return Err("not a valid branch name".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    use tempfile::TempDir;

    #[test]
    fn parse_github_shorthand() {
        let spec = RemoteSpec::parse("acme/modules").unwrap();

        assert_eq!(spec.url, "https://github.com/acme/modules.git");
        assert_eq!(spec.key, "acme-modules");
        assert!(!spec.direct);
    }

    #[test]
    fn parse_https_repository() {
        let spec = RemoteSpec::parse("https://gitlab.example.com/acme/modules.git").unwrap();

        assert_eq!(spec.url, "https://gitlab.example.com/acme/modules.git");
        assert_eq!(spec.key, "acme-modules");
        assert!(!spec.direct);
    }

    #[test]
    fn parse_https_index_file() {
        let spec = RemoteSpec::parse(
            "https://raw.githubusercontent.com/acme/modules/main/v1.yaml",
        )
        .unwrap();

        assert_eq!(spec.key, "acme-modules");
        assert!(spec.direct);
    }

    #[test]
    fn parse_rejects_bad_specs() {
        for spec in [
            "modules",
            "acme/modules/extra",
            "/modules",
            "acme/",
            "http://github.com/acme/modules",
            "git@github.com:acme/modules.git",
            "https://github.com/acme",
            "https:///acme/modules",
            "-acme/modules",
            "acme/mod ules",
        ] {
            let err = RemoteSpec::parse(spec).unwrap_err();
            assert!(matches!(err, CatalogError::BadSpec { .. }), "{spec}");
        }
    }

    #[test]
    fn install_refuses_existing_without_force() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path()).unwrap();
        let existing = layout.repos_dir().join("acme-modules.yaml");
        fs::write(&existing, "kind: Repository\nname: old\n").unwrap();

        let err = install(&layout, "acme/modules", false, None).unwrap_err();

        assert!(matches!(err, CatalogError::AlreadyInstalled { .. }));
        assert_eq!(
            fs::read_to_string(existing).unwrap(),
            "kind: Repository\nname: old\n"
        );
    }

    #[test]
    fn install_rejects_bad_branch() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path()).unwrap();

        let err = install(&layout, "acme/modules", false, Some("--upload-pack=x")).unwrap_err();
        assert!(matches!(err, CatalogError::BadSpec { .. }));
    }

    #[test]
    fn store_refuses_name_declared_by_another_file() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path()).unwrap();
        let existing = layout.repos_dir().join("acme-modules.yaml");
        fs::write(&existing, "kind: Repository\nname: shared\n").unwrap();
        let dest = layout.repos_dir().join("other-modules.yaml");

        let err = store(&layout, "u", b"kind: Repository\nname: shared\n", &dest).unwrap_err();

        assert!(matches!(err, CatalogError::NameInUse { path, .. } if path == existing));
        assert!(!dest.exists());
    }

    #[test]
    fn store_replaces_its_own_file() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path()).unwrap();
        let dest = layout.repos_dir().join("acme-modules.yaml");
        fs::write(&dest, "kind: Repository\nname: shared\n").unwrap();

        let repo = store(&layout, "u", b"kind: Repository\nname: shared\nversion: v2\n", &dest)
            .unwrap();

        assert_eq!(repo.name, "shared");
        assert!(fs::read_to_string(&dest).unwrap().contains("version: v2"));
    }

    #[cfg(unix)]
    #[test]
    fn chatty_stderr_does_not_stall_the_child() {
        // Well past a pipe buffer of output before exiting.
        let script = "i=0; while [ $i -lt 4000 ]; do echo progress line $i >&2; i=$((i+1)); done; exit 3";
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script]);

        let err = run_with_timeout(cmd, Duration::from_secs(60)).unwrap_err();

        assert!(err.contains("progress line 3999"), "{err}");
        assert!(!err.contains("timed out"), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn slow_child_is_killed_after_timeout() {
        let mut cmd = Command::new("sleep");
        cmd.arg("30");

        let err = run_with_timeout(cmd, Duration::from_millis(200)).unwrap_err();
        assert!(err.contains("timed out"), "{err}");
    }

    #[test]
    fn validate_checks_kind() {
        let ok = validate("u", b"kind: Repository\nname: r\n").unwrap();
        assert_eq!(ok.name, "r");

        let err = validate("u", b"kind: Config\nname: r\n").unwrap_err();
        assert!(matches!(err, CatalogError::Invalid { .. }));

        let err = validate("u", b"just text").unwrap_err();
        assert!(matches!(err, CatalogError::Invalid { .. }));
    }
}
