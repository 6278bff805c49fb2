// src/dataset/changelog.rs

//! Change log for persisted snapshots
//!
//! The versioned-storage collaborator: callers stage every file before
//! writing it, then commit one human-readable message for the batch. If the
//! batch fails, `rollback` restores the staged files to their pre-stage
//! content.
//!
//! The built-in [`JournalChangeLog`] appends one line per commit to
//! `.litrev/history.journal`:
//!
//! `{crc32_hex}|{json}\n`
//!
//! Reading stops at the first line whose checksum does not match.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Identifier of a committed change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitId(pub String);

impl std::fmt::Display for CommitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A file recorded in a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedFile {
    /// Path relative to the repository root
    pub path: PathBuf,
    /// SHA-256 of the committed content (None if the file was removed)
    pub sha256: Option<String>,
}

/// One journal line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub id: CommitId,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub files: Vec<CommittedFile>,
}

/// Versioned-storage interface used by the dataset
pub trait ChangeLog {
    /// Register a file about to be written (path relative to the root)
    fn stage(&mut self, path: &Path) -> Result<()>;

    /// Files staged since the last commit or rollback
    fn staged(&self) -> Vec<PathBuf>;

    /// Record the staged files; `None` when nothing was staged
    fn commit(&mut self, message: &str) -> Result<Option<CommitId>>;

    /// Restore staged files to their content before staging
    fn rollback(&mut self) -> Result<()>;

    /// All commits, oldest first
    fn history(&self) -> Result<Vec<Commit>>;
}

/// Journal-file change log
pub struct JournalChangeLog {
    root: PathBuf,
    journal_path: PathBuf,
    /// Staged path -> content before the first write (None: did not exist)
    staged: BTreeMap<PathBuf, Option<Vec<u8>>>,
}

impl JournalChangeLog {
    pub fn new(root: &Path, journal_path: PathBuf) -> Self {
        Self {
            root: root.to_path_buf(),
            journal_path,
            staged: BTreeMap::new(),
        }
    }

    pub fn journal_path(&self) -> &Path {
        &self.journal_path
    }

    fn append(&self, commit: &Commit) -> Result<()> {
        if let Some(parent) = self.journal_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(commit)?;
        let crc = crc32fast::hash(json.as_bytes());

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.journal_path)?;
        writeln!(file, "{:08x}|{}", crc, json)?;
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }
}

/// Hex SHA-256 of a file's content
pub fn file_sha256(path: &Path) -> Result<Option<String>> {
    match fs::read(path) {
        Ok(content) => Ok(Some(hex::encode(Sha256::digest(&content)))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl ChangeLog for JournalChangeLog {
    fn stage(&mut self, path: &Path) -> Result<()> {
        if self.staged.contains_key(path) {
            return Ok(());
        }
        let previous = match fs::read(self.root.join(path)) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), "staged");
        self.staged.insert(path.to_path_buf(), previous);
        Ok(())
    }

    fn staged(&self) -> Vec<PathBuf> {
        self.staged.keys().cloned().collect()
    }

    fn commit(&mut self, message: &str) -> Result<Option<CommitId>> {
        if self.staged.is_empty() {
            return Ok(None);
        }

        let files = self
            .staged
            .keys()
            .map(|path| {
                Ok(CommittedFile {
                    path: path.clone(),
                    sha256: file_sha256(&self.root.join(path))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let commit = Commit {
            id: CommitId(uuid::Uuid::new_v4().to_string()),
            timestamp: Utc::now(),
            message: message.to_string(),
            files,
        };
        self.append(&commit)
            .map_err(|e| Error::ChangeLog(format!("failed to append journal entry: {e}")))?;
        self.staged.clear();

        info!(commit = %commit.id, "committed: {}", message.lines().next().unwrap_or_default());
        Ok(Some(commit.id))
    }

    fn rollback(&mut self) -> Result<()> {
        for (path, previous) in std::mem::take(&mut self.staged) {
            let full = self.root.join(&path);
            match previous {
                Some(content) => fs::write(&full, content)?,
                None => {
                    if full.exists() {
                        fs::remove_file(&full)?;
                    }
                }
            }
            warn!(path = %path.display(), "rolled back");
        }
        Ok(())
    }

    fn history(&self) -> Result<Vec<Commit>> {
        let file = match File::open(&self.journal_path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut commits = Vec::new();
        for (line_num, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let Some((crc, json)) = line.split_once('|') else {
                warn!("malformed journal line {}: missing delimiter", line_num + 1);
                break;
            };
            let expected = u32::from_str_radix(crc, 16)
                .map_err(|_| Error::ChangeLog(format!("invalid CRC32 at line {}: {crc}", line_num + 1)))?;
            let actual = crc32fast::hash(json.as_bytes());
            if expected != actual {
                warn!(
                    "CRC mismatch at journal line {}: expected {:08x}, got {:08x}",
                    line_num + 1,
                    expected,
                    actual
                );
                break;
            }
            commits.push(serde_json::from_str(json)?);
        }
        Ok(commits)
    }
}
