//! SSH keypair generation into an environment's shared directory.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::model::KeypairHandle;

pub const DEFAULT_KEY_NAME: &str = "id_rsa";

#[derive(Debug, thiserror::Error)]
pub enum KeygenError {
    #[error("key {} already exists", path.display())]
    Exists { path: PathBuf },

    #[error("invalid key name {0:?}")]
    BadName(String),

    #[error("failed to run {program}: {source}")]
    Spawn { program: String, source: io::Error },

    #[error("{program} failed ({status}): {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
}

/// Drives `ssh-keygen`.
pub struct Keygen {
    program: String,
}

impl Default for Keygen {
    fn default() -> Self {
        Self {
            program: "ssh-keygen".to_string(),
        }
    }
}

impl Keygen {
    #[cfg(test)]
    fn with_program(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }

    /// Writes a 4096-bit RSA keypair `<dir>/<name>` and `<dir>/<name>.pub`.
    pub fn create(&self, dir: &Path, name: &str) -> Result<KeypairHandle, KeygenError> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(KeygenError::BadName(name.to_string()));
        }
        let path = dir.join(name);
        if path.exists() {
            return Err(KeygenError::Exists { path });
        }

        let output = Command::new(&self.program)
            .args(["-q", "-t", "rsa", "-b", "4096", "-N", "", "-C", "harbor", "-f"])
            .arg(&path)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| KeygenError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(KeygenError::Failed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        tracing::debug!(key = %path.display(), "generated keypair");
        Ok(KeypairHandle {
            name: name.to_string(),
        })
    }
}
