// src/dedupe/mod.rs

//! Dedup boundary guard
//!
//! Only two pairings are ever legal merge candidates:
//! - candidate x candidate (both `md_prepared`)
//! - candidate x resolved (`md_processed` or beyond)
//!
//! Resolved records were already deduplicated and are never compared with
//! each other again. Every proposed merge then passes two safeguards before
//! it is applied:
//! - same-source: records sharing an origin prefix are refused and put on
//!   the manual validation list
//! - already-distinct: a recorded non-duplicate decision refuses the merge
//!   regardless of the current score
//!
//! A refused merge is a normal outcome, not an error; the run continues.

pub mod collaborator;

pub use collaborator::{
    DECISIONS_FILE, DecisionStore, DedupeEngine, FieldSimilarityEngine, FieldSimilarityIndex,
    Neighbour, PendingValidation, SimilarityIndex, Verdict,
};

use crate::lifecycle::StatusMachine;
use crate::provenance::{ProvenanceTracker, UpdateOptions};
use crate::record::{Record, RecordSet, RecordStatus, UNKNOWN};
use crate::{Error, Result};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info, warn};

/// Side of the dedupe boundary a record is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Candidate,
    Resolved,
}

/// Which side a record is on; None if it is not part of deduplication
pub fn side(record: &Record) -> Option<Side> {
    if record.status == RecordStatus::Prepared {
        Some(Side::Candidate)
    } else if record.status.is_resolved() {
        Some(Side::Resolved)
    } else {
        None
    }
}

/// Whether two records may be proposed as duplicates
pub fn legal_pairing(a: &Record, b: &Record) -> bool {
    matches!(
        (side(a), side(b)),
        (Some(Side::Candidate), Some(_)) | (Some(Side::Resolved), Some(Side::Candidate))
    )
}

/// Candidate and resolved ids of a record set
#[derive(Debug, Default, Clone)]
pub struct Partition {
    pub candidates: Vec<String>,
    pub resolved: Vec<String>,
}

pub fn partition(records: &RecordSet) -> Partition {
    let mut partition = Partition::default();
    for record in records.values() {
        match side(record) {
            Some(Side::Candidate) => partition.candidates.push(record.id.clone()),
            Some(Side::Resolved) => partition.resolved.push(record.id.clone()),
            None => {}
        }
    }
    partition
}

/// A pair proposed by the similarity collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct MergeProposal {
    pub a: String,
    pub b: String,
    pub score: f64,
    pub known_distinct: bool,
}

/// Why a proposed merge was refused
#[derive(Debug, Clone, PartialEq)]
pub enum Refusal {
    /// Both records already resolved, or one of them is not deduplicable
    IllegalPairing,
    /// Both records carry origins from this source
    SameSource { prefix: String },
    /// A non-duplicate decision exists for the pair
    KnownDistinct,
}

impl fmt::Display for Refusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Refusal::IllegalPairing => f.write_str("pairing outside the dedupe boundary"),
            Refusal::SameSource { prefix } => write!(f, "same source ({prefix})"),
            Refusal::KnownDistinct => f.write_str("marked as non-duplicate"),
        }
    }
}

/// Result of one guarded merge
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    Merged { survivor: String, retired: String },
    Refused { proposal: MergeProposal, refusal: Refusal },
}

/// Candidate pairs for every prepared record, each pair once
///
/// Neighbours outside the boundary and pairs below `min_score` are dropped.
pub fn propose_pairs(
    records: &RecordSet,
    index: &dyn SimilarityIndex,
    neighbours: usize,
    min_score: f64,
) -> Result<Vec<MergeProposal>> {
    let mut seen = BTreeSet::new();
    let mut proposals = Vec::new();

    for record in records.values().filter(|r| side(r) == Some(Side::Candidate)) {
        for neighbour in index.neighbours(record, neighbours)? {
            if neighbour.score < min_score {
                continue;
            }
            let Some(other) = records.get(&neighbour.id) else {
                continue;
            };
            if !legal_pairing(record, other) {
                continue;
            }
            let key = if record.id <= other.id {
                (record.id.clone(), other.id.clone())
            } else {
                (other.id.clone(), record.id.clone())
            };
            if !seen.insert(key) {
                continue;
            }
            proposals.push(MergeProposal {
                a: record.id.clone(),
                b: other.id.clone(),
                score: neighbour.score,
                known_distinct: neighbour.known_distinct,
            });
        }
    }

    proposals.sort_by(|x, y| {
        y.score
            .total_cmp(&x.score)
            .then_with(|| x.a.cmp(&y.a))
            .then_with(|| x.b.cmp(&y.b))
    });
    debug!(proposals = proposals.len(), "duplicate candidates proposed");
    Ok(proposals)
}

/// Shared origin prefix of two records, if any
pub fn shared_source(a: &Record, b: &Record) -> Option<String> {
    let prefixes: BTreeSet<&str> = a.origin_prefixes().into_iter().collect();
    b.origin_prefixes()
        .into_iter()
        .find(|p| prefixes.contains(p))
        .map(str::to_string)
}

/// Validates and applies merges
pub struct DedupeGuard<'a> {
    tracker: &'a ProvenanceTracker,
    engine: &'a dyn DedupeEngine,
}

impl<'a> DedupeGuard<'a> {
    pub fn new(tracker: &'a ProvenanceTracker, engine: &'a dyn DedupeEngine) -> Self {
        Self { tracker, engine }
    }

    /// Check a proposal against the boundary and both safeguards
    pub fn check(&self, a: &Record, b: &Record, known_distinct: bool) -> Result<Option<Refusal>> {
        if !legal_pairing(a, b) {
            return Ok(Some(Refusal::IllegalPairing));
        }
        // A recorded decision settles the pair before any other safeguard
        if known_distinct || self.engine.compare(a, b)?.non_duplicate {
            return Ok(Some(Refusal::KnownDistinct));
        }
        if let Some(prefix) = shared_source(a, b) {
            return Ok(Some(Refusal::SameSource { prefix }));
        }
        Ok(None)
    }

    /// Best (lowest) source rank among a record's origins
    fn best_rank(&self, record: &Record) -> usize {
        let priority = self.tracker.priority();
        record
            .origin_prefixes()
            .into_iter()
            .map(|p| priority.rank(p))
            .min()
            .unwrap_or(usize::MAX)
    }

    /// Order two records by survivorship: `Less` means `a` survives
    ///
    /// Resolved records beat candidates, then the higher-priority source,
    /// then the smaller id.
    pub fn survivor_order(&self, a: &Record, b: &Record) -> Ordering {
        let resolved = |r: &Record| if r.status.is_resolved() { 0 } else { 1 };
        resolved(a)
            .cmp(&resolved(b))
            .then_with(|| self.best_rank(a).cmp(&self.best_rank(b)))
            .then_with(|| a.id.cmp(&b.id))
    }

    /// Apply a proposal to the record set
    ///
    /// On success the retired record leaves the set, its origins move to the
    /// survivor, and a prepared survivor advances to `md_processed`. The
    /// set is untouched if the survivor cannot enter `md_processed`.
    pub fn merge(
        &self,
        records: &mut RecordSet,
        proposal: &MergeProposal,
        machine: &mut StatusMachine,
    ) -> Result<MergeOutcome> {
        let a = records
            .get(&proposal.a)
            .ok_or_else(|| Error::UnknownRecord(proposal.a.clone()))?;
        let b = records
            .get(&proposal.b)
            .ok_or_else(|| Error::UnknownRecord(proposal.b.clone()))?;

        if let Some(refusal) = self.check(a, b, proposal.known_distinct)? {
            warn!(a = %a.id, b = %b.id, score = proposal.score, %refusal, "merge refused");
            return Ok(MergeOutcome::Refused {
                proposal: proposal.clone(),
                refusal,
            });
        }

        let (survivor, retired) = match self.survivor_order(a, b) {
            Ordering::Greater => (b, a),
            _ => (a, b),
        };
        let mut merged = survivor.clone();
        self.merge_into(&mut merged, retired);

        if !merged.status.is_resolved() {
            machine.transition(&mut merged, RecordStatus::Processed)?;
        }

        let retired_id = retired.id.clone();
        let survivor_id = merged.id.clone();
        if let Some(retired) = records.remove(&retired_id) {
            machine.retire(&retired, &survivor_id);
        }
        info!(
            survivor = %survivor_id,
            retired = %retired_id,
            score = proposal.score,
            origins = merged.origins.len(),
            "records merged"
        );
        records.insert(survivor_id.clone(), merged);

        Ok(MergeOutcome::Merged {
            survivor: survivor_id,
            retired: retired_id,
        })
    }

    /// Union origins and fields of `retired` into `survivor`
    ///
    /// Fields follow the provenance rules: unknown values are filled, set
    /// values are only replaced by a source that outranks the current one.
    fn merge_into(&self, survivor: &mut Record, retired: &Record) {
        for origin in &retired.origins {
            survivor.add_origin(origin.clone());
        }

        let fallback = retired
            .origins
            .first()
            .map(|o| o.to_string())
            .unwrap_or_else(|| retired.id.clone());

        for (field, value) in &retired.fields {
            if value == UNKNOWN {
                continue;
            }
            let source = retired
                .provenance(field)
                .and_then(|p| p.source())
                .unwrap_or(&fallback)
                .to_string();

            let replace = match survivor.get(field) {
                None | Some(UNKNOWN) => true,
                Some(_) => survivor
                    .provenance(field)
                    .and_then(|p| p.source())
                    .is_some_and(|current| {
                        current != source
                            && self.tracker.outranks(&source, current)
                            && !self.tracker.outranks(current, &source)
                    }),
            };
            if !replace {
                continue;
            }

            let result = self
                .tracker
                .update_field(survivor, field, value, &source, UpdateOptions::default());
            if result.changed()
                && let Some(entry) = retired.provenance(field)
            {
                for note in &entry.notes {
                    survivor.provenance_entry(field).add_note(note);
                }
            }
        }
    }
}
