//! Advisory per-environment lock.
//!
//! Writers hold an exclusive lock on `<envs>/<uuid>.lock` while they read,
//! modify and write a manifest. The lock file sits beside the environment
//! directory so it never ends up in an export. It is never deleted: a waiter
//! may already hold an open handle to it.

use std::fs;

use fs2::FileExt;
use uuid::Uuid;

use super::{Result, Storage, StorageError};

/// Holds the lock until dropped.
pub struct ManifestLock {
    file: fs::File,
}

impl Drop for ManifestLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl Storage {
    /// Blocks until the environment's manifest lock is acquired.
    pub fn lock(&self, id: Uuid) -> Result<ManifestLock> {
        if !self.environment_dir(id).is_dir() {
            return Err(StorageError::NotFound(id));
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.root.join(format!("{id}.lock")))?;
        file.lock_exclusive()?;
        Ok(ManifestLock { file })
    }
}
