// src/lifecycle/mod.rs

//! Status state machine
//!
//! All status changes go through [`StatusMachine`]. Normal transitions only
//! move forward along the pipeline graph (skipping passthrough stages is
//! allowed when the target is reachable) and must satisfy the target state's
//! preconditions. Backward moves are only possible through
//! [`StatusMachine::reset`], which requires a reason and is recorded in the
//! audit trail.

use crate::provenance::NOTE_NOT_MISSING;
use crate::record::{
    PRESCREEN_EXCLUSION_FIELD, Record, RecordStatus, SCREENING_CRITERIA_FIELD, UNKNOWN,
    is_masterdata_field, required_fields,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info};

/// Exclusion reason stored for retracted works
pub const RETRACTED_REASON: &str = "retracted";

/// How a status change came about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Transition,
    Reset,
    Retraction,
    Merge,
}

/// One entry of the audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub record_id: String,
    pub from: RecordStatus,
    pub to: RecordStatus,
    pub kind: ChangeKind,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    /// One-line summary for change messages
    pub fn summary(&self) -> String {
        match &self.reason {
            Some(reason) => format!("{}: {} -> {} ({reason})", self.record_id, self.from, self.to),
            None => format!("{}: {} -> {}", self.record_id, self.from, self.to),
        }
    }
}

/// Whether `to` can be reached from `from` by forward transitions
pub fn reachable(from: RecordStatus, to: RecordStatus) -> bool {
    if from == to {
        return true;
    }
    let mut queue = VecDeque::from([from]);
    while let Some(status) = queue.pop_front() {
        for &next in status.successors() {
            if next == to {
                return true;
            }
            if next < to {
                queue.push_back(next);
            }
        }
    }
    false
}

/// Validates and applies status transitions, keeping an audit trail
#[derive(Debug, Default)]
pub struct StatusMachine {
    audit: Vec<AuditEntry>,
}

impl StatusMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move a record forward to `to`
    ///
    /// A transition to the current status is a no-op.
    pub fn transition(&mut self, record: &mut Record, to: RecordStatus) -> Result<()> {
        let from = record.status;
        if from == to {
            return Ok(());
        }
        if !reachable(from, to) {
            return Err(Error::ProcessOrderViolation {
                id: record.id.clone(),
                from,
                to,
            });
        }
        check_preconditions(record, to)?;

        self.apply(record, to, ChangeKind::Transition, None);
        Ok(())
    }

    /// Whether a transition would succeed, without applying it
    pub fn can_transition(record: &Record, to: RecordStatus) -> Result<()> {
        if record.status != to && !reachable(record.status, to) {
            return Err(Error::ProcessOrderViolation {
                id: record.id.clone(),
                from: record.status,
                to,
            });
        }
        check_preconditions(record, to)
    }

    /// Audited reset to an earlier state
    ///
    /// Removes annotations that belong to the stages being undone.
    pub fn reset(&mut self, record: &mut Record, to: RecordStatus, reason: &str) -> Result<()> {
        if reason.trim().is_empty() {
            return Err(Error::InvalidReset {
                id: record.id.clone(),
                reason: "a reason is required".to_string(),
            });
        }
        if to >= record.status {
            return Err(Error::InvalidReset {
                id: record.id.clone(),
                reason: format!("{to} is not earlier than {}", record.status),
            });
        }

        if to < RecordStatus::PrescreenExcluded {
            record.remove_field(PRESCREEN_EXCLUSION_FIELD);
        }
        if to < RecordStatus::Excluded {
            record.remove_field(SCREENING_CRITERIA_FIELD);
        }

        info!(record = %record.id, from = %record.status, to = %to, reason, "status reset");
        self.apply(record, to, ChangeKind::Reset, Some(reason.to_string()));
        Ok(())
    }

    /// Prescreen-exclude a retracted record and clear its stale warning
    ///
    /// Records already past prescreen are reset back to the exclusion state.
    /// Returns false if the record was already excluded for retraction.
    pub fn exclude_retracted(&mut self, record: &mut Record) -> Result<bool> {
        if record.status == RecordStatus::PrescreenExcluded
            && record.get(PRESCREEN_EXCLUSION_FIELD) == Some(RETRACTED_REASON)
        {
            return Ok(false);
        }

        record.insert_field(PRESCREEN_EXCLUSION_FIELD, RETRACTED_REASON);
        record.remove_field("warning");

        let to = RecordStatus::PrescreenExcluded;
        if record.status == to {
            return Ok(true);
        }
        if !reachable(record.status, to) {
            info!(record = %record.id, from = %record.status, "retracted record reset to prescreen exclusion");
            record.remove_field(SCREENING_CRITERIA_FIELD);
        }
        self.apply(record, to, ChangeKind::Retraction, Some(RETRACTED_REASON.to_string()));
        Ok(true)
    }

    /// Record that `retired` was merged into `survivor_id` and left the set
    pub fn retire(&mut self, retired: &Record, survivor_id: &str) {
        info!(record = %retired.id, survivor = survivor_id, "record merged");
        self.audit.push(AuditEntry {
            record_id: retired.id.clone(),
            from: retired.status,
            to: retired.status,
            kind: ChangeKind::Merge,
            reason: Some(format!("merged into {survivor_id}")),
            timestamp: Utc::now(),
        });
    }

    pub fn audit(&self) -> &[AuditEntry] {
        &self.audit
    }

    /// Drain the audit trail (after it was persisted)
    pub fn take_audit(&mut self) -> Vec<AuditEntry> {
        std::mem::take(&mut self.audit)
    }

    fn apply(&mut self, record: &mut Record, to: RecordStatus, kind: ChangeKind, reason: Option<String>) {
        let from = record.status;
        record.status = to;
        record.mark_dirty();
        debug!(record = %record.id, %from, %to, "status changed");
        self.audit.push(AuditEntry {
            record_id: record.id.clone(),
            from,
            to,
            kind,
            reason,
            timestamp: Utc::now(),
        });
    }
}

/// Field-set conditions required to enter a state
pub fn check_preconditions(record: &Record, to: RecordStatus) -> Result<()> {
    let not_ready = |condition: String| Error::RecordNotReady {
        id: record.id.clone(),
        target: to,
        condition,
    };

    match to {
        RecordStatus::Imported => {
            if record.origins.is_empty() {
                return Err(not_ready("record has no origin".to_string()));
            }
        }
        RecordStatus::Prepared => {
            if let Some((field, note)) = record.defects().into_iter().next() {
                return Err(not_ready(format!("{field} has quality defect '{note}'")));
            }
        }
        RecordStatus::Processed => {
            for field in required_fields(&record.entry_type) {
                let covered = record.fields.contains_key(*field)
                    && record.masterdata_provenance.contains_key(*field);
                if !covered {
                    return Err(not_ready(format!("masterdata provenance missing for {field}")));
                }
                if record.get(field) == Some(UNKNOWN)
                    && !record
                        .provenance(field)
                        .is_some_and(|p| p.has_note(NOTE_NOT_MISSING))
                {
                    return Err(not_ready(format!("{field} is UNKNOWN")));
                }
            }
            if let Some(field) = record
                .field_names()
                .find(|f| is_masterdata_field(f) && !record.masterdata_provenance.contains_key(*f))
            {
                return Err(not_ready(format!("masterdata provenance missing for {field}")));
            }
        }
        RecordStatus::PrescreenExcluded => {
            if record.get(PRESCREEN_EXCLUSION_FIELD).is_none() {
                return Err(not_ready(format!("{PRESCREEN_EXCLUSION_FIELD} not set")));
            }
        }
        RecordStatus::PdfImported
        | RecordStatus::PdfNeedsManualPreparation
        | RecordStatus::PdfPrepared => {
            if record.get("file").is_none() {
                return Err(not_ready("no file linked".to_string()));
            }
        }
        RecordStatus::Excluded => {
            if record.get(SCREENING_CRITERIA_FIELD).is_none() {
                return Err(not_ready(format!("{SCREENING_CRITERIA_FIELD} not set")));
            }
        }
        _ => {}
    }
    Ok(())
}
