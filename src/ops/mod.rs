// src/ops/mod.rs

//! Review operations
//!
//! Each pipeline step is a function over a [`ReviewContext`]: the repository
//! root, its settings, the dataset handle, the provenance tracker and the
//! status machine. Nothing is global; commands open one context per run.
//!
//! Operations load the main record set, mutate it only through the
//! tracker, the state machine or the dedupe guard, save it, and commit one
//! change-log entry whose body lists the audited status changes.

pub mod dedupe;
pub mod init;
pub mod load;
pub mod prep;
pub mod reset;
pub mod screen;
pub mod search;
pub mod stats;
pub mod validate;

pub use dedupe::{DedupeReport, ManualDecision, run_dedupe, run_manual_decision};
pub use init::init;
pub use load::{LoadReport, generate_id, load};
pub use prep::{PrepReport, prep};
pub use reset::reset;
pub use screen::{
    PdfReport, ScreenDecision, ScreenReport, data, pdfs, prescreen, screen,
};
pub use search::{SearchReport, SourceFailure, SourceOutcome, add_source, search};
pub use stats::{StatusStats, stats};
pub use validate::{Violation, validate};

use crate::dataset::{CommitId, Dataset};
use crate::lifecycle::StatusMachine;
use crate::provenance::ProvenanceTracker;
use crate::record::RecordSet;
use crate::settings::{SETTINGS_FILE, Settings};
use crate::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Everything an operation needs, passed explicitly
pub struct ReviewContext {
    root: PathBuf,
    pub settings: Settings,
    pub dataset: Dataset,
    pub tracker: ProvenanceTracker,
    pub machine: StatusMachine,
    /// Proceed past per-source failures with a warning
    pub force: bool,
}

impl ReviewContext {
    /// Open an initialized repository
    pub fn open(root: &Path, force: bool) -> Result<Self> {
        let settings = Settings::load(root)?;
        Ok(Self::with_settings(root, settings, force))
    }

    pub fn with_settings(root: &Path, settings: Settings, force: bool) -> Self {
        let dataset = Dataset::open(root, settings.persistence.retry_policy());
        let tracker = ProvenanceTracker::new(settings.source_priority());
        Self {
            root: root.to_path_buf(),
            settings,
            dataset,
            tracker,
            machine: StatusMachine::new(),
            force,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn load_records(&self) -> Result<RecordSet> {
        self.dataset.load_records()
    }

    pub fn save_records(&mut self, records: &mut RecordSet) -> Result<()> {
        self.dataset.save_records(records)
    }

    /// Persist the settings (after a source was added)
    pub fn save_settings(&mut self) -> Result<()> {
        self.settings.validate()?;
        let content = self.settings.to_toml()?;
        self.dataset.write_file(Path::new(SETTINGS_FILE), content.as_bytes())?;
        self.tracker = ProvenanceTracker::new(self.settings.source_priority());
        Ok(())
    }

    /// Commit staged files; the message body lists the audited status changes
    pub fn commit(&mut self, summary: &str) -> Result<Option<CommitId>> {
        let audit = self.machine.take_audit();
        let mut message = summary.to_string();
        if !audit.is_empty() {
            message.push_str("\n\n");
            let lines: Vec<String> = audit.iter().map(|e| e.summary()).collect();
            message.push_str(&lines.join("\n"));
        }
        debug!(changes = audit.len(), "committing");
        self.dataset.commit(&message)
    }

    /// Undo staged writes after a failed operation
    pub fn abort(&mut self) -> Result<()> {
        self.machine.take_audit();
        self.dataset.rollback()
    }
}

/// Parse a comma-separated id selection
pub fn parse_selection(selection: Option<&str>) -> Option<Vec<String>> {
    selection.filter(|s| *s != "all").map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_uninitialized() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            ReviewContext::open(dir.path(), false),
            Err(crate::Error::NotInitialized(_))
        ));
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!(parse_selection(None), None);
        assert_eq!(parse_selection(Some("all")), None);
        assert_eq!(
            parse_selection(Some("Smith2020, Lee2021,")),
            Some(vec!["Smith2020".to_string(), "Lee2021".to_string()])
        );
    }
}
