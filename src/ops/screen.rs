// src/ops/screen.rs

//! Prescreen, PDF retrieval, screen and synthesis steps
//!
//! These steps only move records forward through the state machine and
//! store the decision annotations the target states require.

use super::{ReviewContext, parse_selection};
use crate::record::{
    PRESCREEN_EXCLUSION_FIELD, Record, RecordSet, RecordStatus, SCREENING_CRITERIA_FIELD,
};
use crate::{Error, Result};
use tracing::{debug, info};

/// Inclusion decisions for a screening step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenDecision {
    /// Include every eligible record
    IncludeAll,
    /// Include and exclude named records; `reason` is stored on exclusions
    Decide {
        include: Vec<String>,
        exclude: Vec<String>,
        reason: String,
    },
}

#[derive(Debug, Default)]
pub struct ScreenReport {
    pub included: Vec<String>,
    pub excluded: Vec<String>,
}

#[derive(Debug, Default)]
pub struct PdfReport {
    pub prepared: Vec<String>,
    pub needs_manual_retrieval: Vec<String>,
    pub not_available: Vec<String>,
}

/// Target states and annotation field of one screening step
struct Step {
    name: &'static str,
    eligible: RecordStatus,
    include: RecordStatus,
    exclude: RecordStatus,
    field: &'static str,
}

const PRESCREEN: Step = Step {
    name: "Prescreen",
    eligible: RecordStatus::Processed,
    include: RecordStatus::PrescreenIncluded,
    exclude: RecordStatus::PrescreenExcluded,
    field: PRESCREEN_EXCLUSION_FIELD,
};

const SCREEN: Step = Step {
    name: "Screen",
    eligible: RecordStatus::PdfPrepared,
    include: RecordStatus::Included,
    exclude: RecordStatus::Excluded,
    field: SCREENING_CRITERIA_FIELD,
};

fn require_known(records: &RecordSet, ids: &[String]) -> Result<()> {
    match ids.iter().find(|id| !records.contains_key(*id)) {
        Some(id) => Err(Error::UnknownRecord(id.clone())),
        None => Ok(()),
    }
}

/// Named records must have reached the step's input state
fn require_eligible(record: &Record, step: &Step, target: RecordStatus) -> Result<()> {
    if record.status < step.eligible {
        return Err(Error::RecordNotReady {
            id: record.id.clone(),
            target,
            condition: format!("record is {} (expected {})", record.status, step.eligible),
        });
    }
    Ok(())
}

fn apply_step(ctx: &mut ReviewContext, step: &Step, decision: &ScreenDecision) -> Result<ScreenReport> {
    let mut records = ctx.load_records()?;
    let report = match decide(ctx, &mut records, step, decision) {
        Ok(report) => report,
        Err(e) => {
            // Nothing was written; drop the audit of the partial batch
            ctx.machine.take_audit();
            return Err(e);
        }
    };

    info!(
        step = step.name,
        included = report.included.len(),
        excluded = report.excluded.len(),
        "screening decisions applied"
    );
    let summary = format!(
        "{}: {} included, {} excluded",
        step.name,
        report.included.len(),
        report.excluded.len()
    );
    commit_records(ctx, &mut records, &summary)?;
    Ok(report)
}

fn decide(
    ctx: &mut ReviewContext,
    records: &mut RecordSet,
    step: &Step,
    decision: &ScreenDecision,
) -> Result<ScreenReport> {
    let mut report = ScreenReport::default();

    match decision {
        ScreenDecision::IncludeAll => {
            for record in records.values_mut().filter(|r| r.status == step.eligible) {
                ctx.machine.transition(record, step.include)?;
                report.included.push(record.id.clone());
            }
        }
        ScreenDecision::Decide {
            include,
            exclude,
            reason,
        } => {
            require_known(records, include)?;
            require_known(records, exclude)?;
            if let Some(id) = include.iter().find(|id| exclude.contains(*id)) {
                return Err(Error::Selection {
                    value: id.clone(),
                    options: vec!["include".into(), "exclude".into()],
                });
            }

            for id in include {
                if let Some(record) = records.get_mut(id) {
                    require_eligible(record, step, step.include)?;
                    ctx.machine.transition(record, step.include)?;
                    report.included.push(id.clone());
                }
            }
            for id in exclude {
                if let Some(record) = records.get_mut(id) {
                    require_eligible(record, step, step.exclude)?;
                    if !reason.trim().is_empty() {
                        record.insert_field(step.field, reason.trim());
                    }
                    ctx.machine.transition(record, step.exclude)?;
                    report.excluded.push(id.clone());
                }
            }
        }
    }
    Ok(report)
}

fn commit_records(ctx: &mut ReviewContext, records: &mut RecordSet, summary: &str) -> Result<()> {
    let saved = ctx.save_records(records);
    if let Err(e) = saved.and_then(|_| ctx.commit(summary)) {
        ctx.abort()?;
        return Err(e);
    }
    Ok(())
}

/// Prescreen deduplicated records
pub fn prescreen(ctx: &mut ReviewContext, decision: &ScreenDecision) -> Result<ScreenReport> {
    apply_step(ctx, &PRESCREEN, decision)
}

/// Full-text screen of prepared PDFs
pub fn screen(ctx: &mut ReviewContext, decision: &ScreenDecision) -> Result<ScreenReport> {
    apply_step(ctx, &SCREEN, decision)
}

/// Link PDFs of prescreen-included records
///
/// Records whose `file` exists under the repository root are imported and
/// prepared; `not_available` ids are marked as unobtainable; everything
/// else waits for manual retrieval.
pub fn pdfs(ctx: &mut ReviewContext, not_available: Option<&str>) -> Result<PdfReport> {
    let unavailable = parse_selection(not_available).unwrap_or_default();
    let mut records = ctx.load_records()?;
    require_known(&records, &unavailable)?;
    let mut report = PdfReport::default();

    for record in records.values_mut() {
        if !matches!(
            record.status,
            RecordStatus::PrescreenIncluded | RecordStatus::PdfNeedsManualRetrieval
        ) {
            continue;
        }

        if unavailable.contains(&record.id) {
            ctx.machine.transition(record, RecordStatus::PdfNotAvailable)?;
            report.not_available.push(record.id.clone());
            continue;
        }

        let linked = record
            .get("file")
            .is_some_and(|file| ctx.root().join(file).is_file());
        if linked {
            ctx.machine.transition(record, RecordStatus::PdfImported)?;
            ctx.machine.transition(record, RecordStatus::PdfPrepared)?;
            report.prepared.push(record.id.clone());
        } else {
            debug!(record = %record.id, "no PDF found");
            ctx.machine.transition(record, RecordStatus::PdfNeedsManualRetrieval)?;
            report.needs_manual_retrieval.push(record.id.clone());
        }
    }

    info!(
        prepared = report.prepared.len(),
        needs_manual_retrieval = report.needs_manual_retrieval.len(),
        not_available = report.not_available.len(),
        "pdf step finished"
    );
    let summary = format!("PDFs: {} prepared", report.prepared.len());
    commit_records(ctx, &mut records, &summary)?;
    Ok(report)
}

/// Mark included records as synthesized
pub fn data(ctx: &mut ReviewContext, selection: Option<&str>) -> Result<Vec<String>> {
    let selected = parse_selection(selection);
    let mut records = ctx.load_records()?;
    if let Some(ids) = &selected {
        require_known(&records, ids)?;
    }

    let mut synthesized = Vec::new();
    for record in records.values_mut() {
        if record.status != RecordStatus::Included {
            continue;
        }
        if selected.as_ref().is_some_and(|ids| !ids.contains(&record.id)) {
            continue;
        }
        ctx.machine.transition(record, RecordStatus::Synthesized)?;
        synthesized.push(record.id.clone());
    }

    info!(records = synthesized.len(), "records synthesized");
    commit_records(ctx, &mut records, &format!("Data: {} synthesized", synthesized.len()))?;
    Ok(synthesized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::init;
    use crate::record::{Origin, Record};
    use tempfile::TempDir;

    fn record(id: &str, status: RecordStatus) -> Record {
        let mut record = Record::new(id, "article")
            .with_field("title", "A study")
            .with_field("author", "Smith, John")
            .with_field("year", "2020")
            .with_field("journal", "MIS Quarterly");
        record.add_origin(Origin::new("crossref", id));
        record.add_provenance_all(&format!("crossref/{id}"));
        record.status = status;
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
    fn test_prescreen_decisions() {
        let (_dir, mut ctx) = seeded(vec![
            record("A2020", RecordStatus::Processed),
            record("B2020", RecordStatus::Processed),
        ]);
        let decision = ScreenDecision::Decide {
            include: vec!["A2020".into()],
            exclude: vec!["B2020".into()],
            reason: "out of scope".into(),
        };
        let report = prescreen(&mut ctx, &decision).unwrap();
        assert_eq!(report.included, vec!["A2020".to_string()]);

        let records = ctx.load_records().unwrap();
        assert_eq!(records["A2020"].status, RecordStatus::PrescreenIncluded);
        assert_eq!(records["B2020"].status, RecordStatus::PrescreenExcluded);
        assert_eq!(records["B2020"].get(PRESCREEN_EXCLUSION_FIELD), Some("out of scope"));
    }

    #[test]
    fn test_exclusion_needs_reason() {
        let (_dir, mut ctx) = seeded(vec![record("A2020", RecordStatus::Processed)]);
        let decision = ScreenDecision::Decide {
            include: vec![],
            exclude: vec!["A2020".into()],
            reason: " ".into(),
        };
        assert!(matches!(
            prescreen(&mut ctx, &decision),
            Err(Error::RecordNotReady { .. })
        ));
        assert_eq!(ctx.load_records().unwrap()["A2020"].status, RecordStatus::Processed);
    }

    #[test]
    fn test_pdfs_and_screen() {
        let (dir, mut ctx) = seeded(vec![
            record("A2020", RecordStatus::PrescreenIncluded).with_field("file", "pdfs/A2020.pdf"),
            record("B2020", RecordStatus::PrescreenIncluded),
            record("C2020", RecordStatus::PrescreenIncluded),
        ]);
        std::fs::create_dir_all(dir.path().join("pdfs")).unwrap();
        std::fs::write(dir.path().join("pdfs/A2020.pdf"), b"%PDF-1.4").unwrap();

        let report = pdfs(&mut ctx, Some("C2020")).unwrap();
        assert_eq!(report.prepared, vec!["A2020".to_string()]);
        assert_eq!(report.needs_manual_retrieval, vec!["B2020".to_string()]);
        assert_eq!(report.not_available, vec!["C2020".to_string()]);

        let report = screen(&mut ctx, &ScreenDecision::IncludeAll).unwrap();
        assert_eq!(report.included, vec!["A2020".to_string()]);
        assert_eq!(data(&mut ctx, None).unwrap(), vec!["A2020".to_string()]);
        assert_eq!(ctx.load_records().unwrap()["A2020"].status, RecordStatus::Synthesized);
    }

    #[test]
    fn test_unknown_selection() {
        let (_dir, mut ctx) = seeded(vec![]);
        assert!(matches!(pdfs(&mut ctx, Some("Nobody2020")), Err(Error::UnknownRecord(_))));
    }
}
