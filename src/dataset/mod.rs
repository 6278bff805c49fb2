// src/dataset/mod.rs

//! On-disk review repository
//!
//! Layout:
//! ```text
//! <root>/
//!   settings.toml
//!   data/records.bib           main record set
//!   data/search/*.bib          one feed snapshot per source
//!   data/dedupe/decisions.json non-duplicate decisions
//!   .litrev/lock               advisory write lock
//!   .litrev/history.journal    change log
//! ```
//!
//! Every write is a complete snapshot written to a temporary file and renamed
//! over the target while holding the repository lock. Lock contention is
//! retried with the configured backoff policy.

mod changelog;
mod lock;

pub use changelog::{ChangeLog, Commit, CommitId, CommittedFile, JournalChangeLog, file_sha256};
pub use lock::RepoLock;

use crate::bib::{self, SnapshotKind};
use crate::record::RecordSet;
use crate::retry::RetryPolicy;
use crate::{Error, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

pub const RECORDS_FILE: &str = "data/records.bib";
pub const SEARCH_DIR: &str = "data/search";
pub const DEDUPE_DIR: &str = "data/dedupe";
pub const STATE_DIR: &str = ".litrev";
pub const LOCK_FILE: &str = ".litrev/lock";
pub const JOURNAL_FILE: &str = ".litrev/history.journal";

/// Write `content` to `path` atomically (temp file + rename)
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Handle to a review repository's persisted state
pub struct Dataset {
    root: PathBuf,
    retry: RetryPolicy,
    changelog: Box<dyn ChangeLog>,
}

impl Dataset {
    /// Open the dataset at `root` with the journal change log
    pub fn open(root: &Path, retry: RetryPolicy) -> Self {
        let changelog = JournalChangeLog::new(root, root.join(JOURNAL_FILE));
        Self::with_changelog(root, retry, Box::new(changelog))
    }

    pub fn with_changelog(root: &Path, retry: RetryPolicy, changelog: Box<dyn ChangeLog>) -> Self {
        Self {
            root: root.to_path_buf(),
            retry,
            changelog,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn records_path(&self) -> PathBuf {
        self.root.join(RECORDS_FILE)
    }

    pub fn changelog(&self) -> &dyn ChangeLog {
        self.changelog.as_ref()
    }

    /// Load a snapshot (empty set if the file does not exist yet)
    pub fn load_snapshot(&self, relative: &Path) -> Result<RecordSet> {
        let path = self.root.join(relative);
        match std::fs::read_to_string(&path) {
            Ok(text) => bib::records_from_str(&text, &relative.to_string_lossy()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RecordSet::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Load the main record set
    pub fn load_records(&self) -> Result<RecordSet> {
        self.load_snapshot(Path::new(RECORDS_FILE))
    }

    /// Persist the main record set and mark its records clean
    pub fn save_records(&mut self, records: &mut RecordSet) -> Result<()> {
        let content = bib::write_records(records.values(), SnapshotKind::Main);
        self.write_file(Path::new(RECORDS_FILE), content.as_bytes())?;
        for record in records.values_mut() {
            record.mark_clean();
        }
        Ok(())
    }

    /// Load a feed snapshot
    pub fn load_feed(&self, relative: &Path) -> Result<RecordSet> {
        self.load_snapshot(relative)
    }

    /// Persist a feed snapshot
    pub fn save_feed(&mut self, relative: &Path, records: &RecordSet) -> Result<()> {
        let content = bib::write_records(records.values(), SnapshotKind::Feed);
        self.write_file(relative, content.as_bytes())
    }

    /// Stage and atomically write a file, retrying on lock contention
    pub fn write_file(&mut self, relative: &Path, content: &[u8]) -> Result<()> {
        let path = self.root.join(relative);
        let lock_path = self.root.join(LOCK_FILE);
        let retry = self.retry;

        let unchanged = std::fs::read(&path).is_ok_and(|current| current == content);
        if unchanged {
            debug!(path = %relative.display(), "content unchanged, not written");
            return Ok(());
        }

        self.changelog.stage(relative)?;
        retry.run(&format!("write {}", relative.display()), || {
            let _lock = RepoLock::try_acquire(&lock_path)?;
            atomic_write(&path, content)
        })?;
        debug!(path = %relative.display(), bytes = content.len(), "snapshot written");
        Ok(())
    }

    /// Commit all staged files with one message
    pub fn commit(&mut self, message: &str) -> Result<Option<CommitId>> {
        let lock_path = self.root.join(LOCK_FILE);
        let retry = self.retry;
        let changelog = &mut self.changelog;
        retry.run("commit", || {
            let _lock = RepoLock::try_acquire(&lock_path)?;
            changelog.commit(message)
        })
    }

    /// Restore staged files after a failed batch
    pub fn rollback(&mut self) -> Result<()> {
        self.changelog.rollback()
    }
}
