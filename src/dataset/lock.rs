// src/dataset/lock.rs

//! Repository write lock
//!
//! An advisory exclusive lock on `.litrev/lock` serializes snapshot writes
//! between separate invocations. Acquisition never blocks: a held lock is
//! reported as [`Error::Contention`] so the caller's retry policy decides
//! how long to wait.

use crate::{Error, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Held repository lock, released on drop
#[derive(Debug)]
pub struct RepoLock {
    file: File,
    path: PathBuf,
}

impl RepoLock {
    /// Try to take the lock once
    pub fn try_acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;

        file.try_lock_exclusive()
            .map_err(|e| Error::Contention(format!("{} is held by another process ({e})", path.display())))?;

        debug!(path = %path.display(), "repository lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_contends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".litrev/lock");

        let held = RepoLock::try_acquire(&path).unwrap();
        let err = RepoLock::try_acquire(&path).unwrap_err();
        assert!(err.is_transient());

        drop(held);
        assert!(RepoLock::try_acquire(&path).is_ok());
    }
}
