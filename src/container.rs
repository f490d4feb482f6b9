//! Container runtime: the narrow interface harbor needs from a container engine.
//!
//! Image presence, image pull with captured logs, and synchronous runs with
//! mounts and environment. [`Docker`] drives the `docker` CLI.

mod docker;

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;

pub use docker::Docker;

#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: io::Error,
    },

    #[error("`{command}` failed ({status}): {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("container exited with {}", code.map_or_else(|| "a signal".to_string(), |c| format!("status {c}")))]
    RunFailed { code: Option<i32> },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A failed pull, with whatever log output was captured before it failed.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct PullFailure {
    pub log: String,
    #[source]
    pub error: ContainerError,
}

/// Everything needed to run one command in an ephemeral container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSpec {
    pub image: String,
    /// Overrides the image entrypoint when non-empty.
    pub command: String,
    pub args: Vec<String>,
    pub work_dir: String,
    /// Container path → host path.
    pub mounts: BTreeMap<String, PathBuf>,
    pub env: BTreeMap<String, String>,
}

pub trait ContainerRuntime {
    /// Whether some local image tag ends with `image`.
    fn image_present(&self, image: &str) -> Result<bool, ContainerError>;

    /// Pulls `image`, returning the combined pull log.
    fn pull(&self, image: &str) -> Result<String, PullFailure>;

    /// Runs the spec to completion, streaming its stdout and stderr to ours.
    fn run(&self, spec: &RunSpec) -> Result<(), ContainerError>;
}
