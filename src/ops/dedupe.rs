// src/ops/dedupe.rs

//! Dedupe: merge duplicate candidates through the boundary guard
//!
//! Pairs at or above the merge threshold are merged automatically. Pairs
//! between the review and the merge threshold send the candidate to
//! `md_needs_manual_merge`. Same-source refusals go on the manual
//! validation list and both records stay `md_prepared` until a curator
//! decides. Every other candidate advances to `md_processed`.

use super::ReviewContext;
use crate::dedupe::{
    DecisionStore, DedupeGuard, FieldSimilarityEngine, FieldSimilarityIndex, MergeOutcome,
    MergeProposal, PendingValidation, Refusal, propose_pairs, side,
};
use crate::record::{RecordSet, RecordStatus};
use crate::{Error, Result};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct DedupeReport {
    /// (survivor, retired) pairs
    pub merged: Vec<(String, String)>,
    pub refused: Vec<(MergeProposal, Refusal)>,
    pub needs_manual_merge: Vec<String>,
    pub processed: Vec<String>,
    /// Candidates held back for manual validation
    pub held: Vec<String>,
}

/// A curator's decision on one pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualDecision {
    /// The records describe different works
    Distinct(String, String),
    /// Merge the records (still subject to the guard)
    Merge(String, String),
}

fn flag(store: &mut DecisionStore, proposal: &MergeProposal, reason: String) {
    store.flag_for_validation(PendingValidation {
        a: proposal.a.clone(),
        b: proposal.b.clone(),
        score: proposal.score,
        reason,
    });
}

/// Run automatic deduplication over all prepared candidates
pub fn run_dedupe(ctx: &mut ReviewContext) -> Result<DedupeReport> {
    let mut records = ctx.load_records()?;
    let mut store = DecisionStore::load(&ctx.dataset)?;
    let thresholds = ctx.settings.dedupe.clone();

    let index = FieldSimilarityIndex::from_set(&records, &store, |r| side(r).is_some());
    let proposals = propose_pairs(
        &records,
        &index,
        thresholds.neighbours,
        thresholds.review_threshold,
    )?;
    info!(indexed = index.len(), proposals = proposals.len(), "dedupe started");

    let engine = FieldSimilarityEngine::new(&store);
    let guard = DedupeGuard::new(&ctx.tracker, &engine);
    let mut report = DedupeReport::default();
    let mut held = BTreeSet::new();

    for proposal in &proposals {
        let (Some(a), Some(b)) = (records.get(&proposal.a), records.get(&proposal.b)) else {
            debug!(a = %proposal.a, b = %proposal.b, "proposal refers to a merged record");
            continue;
        };

        if proposal.score < thresholds.merge_threshold {
            match guard.check(a, b, proposal.known_distinct)? {
                None => {
                    for id in [&proposal.a, &proposal.b] {
                        let record = records
                            .get_mut(id)
                            .ok_or_else(|| Error::UnknownRecord(id.clone()))?;
                        if record.status == RecordStatus::Prepared {
                            ctx.machine.transition(record, RecordStatus::NeedsManualMerge)?;
                            report.needs_manual_merge.push(id.clone());
                        }
                    }
                }
                Some(refusal) => {
                    if matches!(refusal, Refusal::SameSource { .. }) {
                        flag(&mut store, proposal, refusal.to_string());
                        held.extend([proposal.a.clone(), proposal.b.clone()]);
                    }
                    report.refused.push((proposal.clone(), refusal));
                }
            }
            continue;
        }

        match guard.merge(&mut records, proposal, &mut ctx.machine) {
            Ok(MergeOutcome::Merged { survivor, retired }) => {
                held.remove(&retired);
                report.merged.push((survivor, retired));
            }
            Ok(MergeOutcome::Refused { proposal, refusal }) => {
                if matches!(refusal, Refusal::SameSource { .. }) {
                    flag(&mut store, &proposal, refusal.to_string());
                    held.extend([proposal.a.clone(), proposal.b.clone()]);
                }
                report.refused.push((proposal, refusal));
            }
            Err(Error::RecordNotReady { id, condition, .. }) => {
                warn!(record = %id, %condition, "merge survivor not ready, flagged for validation");
                flag(&mut store, proposal, format!("survivor {id} not ready: {condition}"));
                held.extend([proposal.a.clone(), proposal.b.clone()]);
            }
            Err(e) => return Err(e),
        }
    }

    advance_candidates(ctx, &mut records, &held, &mut report)?;
    report.held = held
        .into_iter()
        .filter(|id| records.get(id).is_some_and(|r| r.status == RecordStatus::Prepared))
        .collect();

    info!(
        merged = report.merged.len(),
        needs_manual_merge = report.needs_manual_merge.len(),
        processed = report.processed.len(),
        held = report.held.len(),
        "dedupe finished"
    );

    let summary = format!("Dedupe: {} merged", report.merged.len());
    let flushed = store
        .save(&mut ctx.dataset)
        .and_then(|_| ctx.save_records(&mut records))
        .and_then(|_| ctx.commit(&summary));
    if let Err(e) = flushed {
        ctx.abort()?;
        return Err(e);
    }
    Ok(report)
}

/// Move every remaining candidate that is not held back to `md_processed`
fn advance_candidates(
    ctx: &mut ReviewContext,
    records: &mut RecordSet,
    held: &BTreeSet<String>,
    report: &mut DedupeReport,
) -> Result<()> {
    for record in records.values_mut() {
        if record.status != RecordStatus::Prepared || held.contains(&record.id) {
            continue;
        }
        match ctx.machine.transition(record, RecordStatus::Processed) {
            Ok(()) => report.processed.push(record.id.clone()),
            Err(Error::RecordNotReady { condition, .. }) => {
                warn!(record = %record.id, %condition, "record stays prepared");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Apply a curator decision on one pair
pub fn run_manual_decision(ctx: &mut ReviewContext, decision: ManualDecision) -> Result<MergeOutcome> {
    let mut records = ctx.load_records()?;
    let mut store = DecisionStore::load(&ctx.dataset)?;

    let (a, b) = match &decision {
        ManualDecision::Distinct(a, b) | ManualDecision::Merge(a, b) => (a.clone(), b.clone()),
    };
    for id in [&a, &b] {
        if !records.contains_key(id) {
            return Err(Error::UnknownRecord(id.clone()));
        }
    }

    let (outcome, summary) = match decision {
        ManualDecision::Distinct(..) => {
            store.mark_distinct(&a, &b);
            for id in [&a, &b] {
                if let Some(record) = records.get_mut(id)
                    && record.status == RecordStatus::NeedsManualMerge
                {
                    ctx.machine.transition(record, RecordStatus::Processed)?;
                }
            }
            info!(a = %a, b = %b, "records marked as distinct");
            let proposal = MergeProposal {
                a: a.clone(),
                b: b.clone(),
                score: 0.0,
                known_distinct: true,
            };
            let outcome = MergeOutcome::Refused {
                proposal,
                refusal: Refusal::KnownDistinct,
            };
            (outcome, format!("Dedupe: {a} and {b} are distinct"))
        }
        ManualDecision::Merge(..) => {
            // Records waiting for a manual merge rejoin the candidate side
            let mut working = records.clone();
            for id in [&a, &b] {
                if let Some(record) = working.get_mut(id)
                    && record.status == RecordStatus::NeedsManualMerge
                {
                    ctx.machine.reset(record, RecordStatus::Prepared, "manual merge")?;
                }
            }

            let proposal = MergeProposal {
                a: a.clone(),
                b: b.clone(),
                score: 1.0,
                known_distinct: store.is_distinct(&a, &b),
            };
            let engine = FieldSimilarityEngine::new(&store);
            let guard = DedupeGuard::new(&ctx.tracker, &engine);
            let outcome = guard.merge(&mut working, &proposal, &mut ctx.machine)?;

            match &outcome {
                MergeOutcome::Merged { survivor, retired } => {
                    store.resolve_validation(retired);
                    records = working;
                    let summary = format!("Dedupe: merge {retired} into {survivor}");
                    (outcome, summary)
                }
                MergeOutcome::Refused { refusal, .. } => {
                    ctx.machine.take_audit();
                    warn!(a = %a, b = %b, %refusal, "manual merge refused");
                    if matches!(refusal, Refusal::SameSource { .. }) {
                        flag(&mut store, &proposal, refusal.to_string());
                    }
                    let summary = format!("Dedupe: merge of {a} and {b} refused");
                    (outcome, summary)
                }
            }
        }
    };

    let flushed = store
        .save(&mut ctx.dataset)
        .and_then(|_| ctx.save_records(&mut records))
        .and_then(|_| ctx.commit(&summary));
    if let Err(e) = flushed {
        ctx.abort()?;
        return Err(e);
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::init;
    use crate::record::{Origin, Record};
    use tempfile::TempDir;

    fn prepared(id: &str, prefix: &str, doi: &str, title: &str, author: &str, year: &str) -> Record {
        let mut record = Record::new(id, "article")
            .with_field("doi", doi)
            .with_field("title", title)
            .with_field("author", author)
            .with_field("year", year)
            .with_field("journal", "MIS Quarterly");
        record.add_origin(Origin::new(prefix, "000001"));
        record.add_provenance_all(&format!("{prefix}/000001"));
        record.status = RecordStatus::Prepared;
        record
    }

    fn seeded(records: Vec<Record>) -> (TempDir, ReviewContext) {
        let dir = TempDir::new().unwrap();
        let mut ctx = init(dir.path(), "Review").unwrap();
        let mut set: RecordSet = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        ctx.save_records(&mut set).unwrap();
        ctx.commit("seed").unwrap();
        (dir, ctx)
    }

    #[test]
    fn test_dedupe_merges_and_advances() {
        let (_dir, mut ctx) = seeded(vec![
            prepared("Smith2020", "crossref", "10.1/A", "Platform ecosystems", "Smith, John", "2020"),
            prepared("Smith2020a", "bibtex", "10.1/a", "Platform ecosystems", "Smith, J.", "2020"),
            prepared("Lee2018", "bibtex", "10.2/b", "Blockchain governance", "Lee, Ann", "2018"),
        ]);

        let report = run_dedupe(&mut ctx).unwrap();
        assert_eq!(report.merged.len(), 1);
        assert!(report.held.is_empty());

        let records = ctx.load_records().unwrap();
        assert_eq!(records.len(), 2);
        let (survivor, _) = &report.merged[0];
        assert_eq!(records[survivor].origins.len(), 2);
        assert_eq!(records[survivor].status, RecordStatus::Processed);
        assert_eq!(records["Lee2018"].status, RecordStatus::Processed);
    }

    #[test]
    fn test_same_source_pair_is_held() {
        let (_dir, mut ctx) = seeded(vec![
            prepared("Smith2020", "crossref", "10.1/A", "Platform ecosystems", "Smith, John", "2020"),
            prepared("Smith2020a", "crossref", "10.1/A", "Platform ecosystems", "Smith, John", "2020"),
        ]);

        let report = run_dedupe(&mut ctx).unwrap();
        assert!(report.merged.is_empty());
        assert_eq!(report.held, vec!["Smith2020".to_string(), "Smith2020a".to_string()]);

        let records = ctx.load_records().unwrap();
        assert!(records.values().all(|r| r.status == RecordStatus::Prepared));
        let store = DecisionStore::load(&ctx.dataset).unwrap();
        assert_eq!(store.manual_validation().len(), 1);

        // A non-duplicate decision clears the validation item
        run_manual_decision(
            &mut ctx,
            ManualDecision::Distinct("Smith2020".into(), "Smith2020a".into()),
        )
        .unwrap();
        let store = DecisionStore::load(&ctx.dataset).unwrap();
        assert!(store.manual_validation().is_empty());
        assert!(store.is_distinct("Smith2020a", "Smith2020"));

        let report = run_dedupe(&mut ctx).unwrap();
        assert!(report.merged.is_empty());
        assert_eq!(report.processed.len(), 2);
    }

    #[test]
    fn test_manual_merge_is_guarded() {
        let (_dir, mut ctx) = seeded(vec![
            prepared("Smith2020", "crossref", "10.1/A", "Platform ecosystems", "Smith, John", "2020"),
            prepared("Lee2018", "crossref", "10.2/b", "Blockchain governance", "Lee, Ann", "2018"),
        ]);

        let outcome = run_manual_decision(
            &mut ctx,
            ManualDecision::Merge("Smith2020".into(), "Lee2018".into()),
        )
        .unwrap();
        assert!(matches!(
            outcome,
            MergeOutcome::Refused { refusal: Refusal::SameSource { .. }, .. }
        ));
        assert_eq!(ctx.load_records().unwrap().len(), 2);
    }

    #[test]
    fn test_manual_decision_unknown_record() {
        let (_dir, mut ctx) = seeded(vec![]);
        let result = run_manual_decision(
            &mut ctx,
            ManualDecision::Distinct("Nobody2020".into(), "Other2021".into()),
        );
        assert!(matches!(result, Err(Error::UnknownRecord(_))));
    }
}
