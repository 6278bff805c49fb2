// src/ops/prep.rs

//! Prep: run the quality model over imported records
//!
//! Clean records move to `md_prepared`; records with defect notes move to
//! (or stay in) `md_needs_manual_preparation` until a curator fixes them.

use super::{ReviewContext, parse_selection};
use crate::quality::QualityModel;
use crate::record::RecordStatus;
use crate::Result;
use std::collections::BTreeMap;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct PrepReport {
    pub prepared: Vec<String>,
    /// Records left for manual preparation with their defects
    pub needs_manual: BTreeMap<String, Vec<(String, String)>>,
}

fn preparable(status: RecordStatus) -> bool {
    matches!(
        status,
        RecordStatus::Imported | RecordStatus::NeedsManualPreparation
    )
}

/// Prepare the selected records (all preparable records by default)
pub fn prep(ctx: &mut ReviewContext, selection: Option<&str>) -> Result<PrepReport> {
    let selected = parse_selection(selection);
    let mut records = ctx.load_records()?;
    let model = QualityModel::with_builtins();
    let mut report = PrepReport::default();

    for record in records.values_mut() {
        if !preparable(record.status) {
            continue;
        }
        if let Some(ids) = &selected
            && !ids.contains(&record.id)
        {
            continue;
        }

        let defects = model.run(record);
        if defects.is_empty() {
            ctx.machine.transition(record, RecordStatus::Prepared)?;
            report.prepared.push(record.id.clone());
        } else {
            ctx.machine.transition(record, RecordStatus::NeedsManualPreparation)?;
            warn!(record = %record.id, defects = defects.len(), "record needs manual preparation");
            report.needs_manual.insert(record.id.clone(), defects);
        }
    }

    if report.prepared.is_empty() && report.needs_manual.is_empty() {
        info!("no records to prepare");
        return Ok(report);
    }

    info!(
        prepared = report.prepared.len(),
        needs_manual = report.needs_manual.len(),
        "prep finished"
    );
    let summary = format!("Prep {} records", report.prepared.len() + report.needs_manual.len());
    let saved = ctx.save_records(&mut records);
    if let Err(e) = saved.and_then(|_| ctx.commit(&summary)) {
        ctx.abort()?;
        return Err(e);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::init;
    use crate::provenance::NOTE_MOSTLY_ALL_CAPS;
    use crate::record::{Origin, Record, RecordSet};
    use tempfile::TempDir;

    fn imported(id: &str, title: &str) -> Record {
        let mut record = Record::new(id, "article")
            .with_field("title", title)
            .with_field("author", "Smith, John")
            .with_field("year", "2020")
            .with_field("journal", "MIS Quarterly");
        record.add_origin(Origin::new("crossref", id));
        record.add_provenance_all(&format!("crossref/{id}"));
        record.status = RecordStatus::Imported;
        record
    }

    fn seed(ctx: &mut ReviewContext, records: Vec<Record>) {
        let mut set: RecordSet = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        ctx.save_records(&mut set).unwrap();
        ctx.commit("seed").unwrap();
    }

    #[test]
    fn test_prep_splits_clean_and_defective() {
        let dir = TempDir::new().unwrap();
        let mut ctx = init(dir.path(), "Review").unwrap();
        seed(
            &mut ctx,
            vec![
                imported("Smith2020", "Platform governance"),
                imported("Smith2020a", "PLATFORM GOVERNANCE IN ECOSYSTEMS"),
            ],
        );

        let report = prep(&mut ctx, None).unwrap();
        assert_eq!(report.prepared, vec!["Smith2020".to_string()]);
        assert!(report.needs_manual["Smith2020a"]
            .iter()
            .any(|(field, note)| field == "title" && note == NOTE_MOSTLY_ALL_CAPS));

        let records = ctx.load_records().unwrap();
        assert_eq!(records["Smith2020"].status, RecordStatus::Prepared);
        assert_eq!(records["Smith2020a"].status, RecordStatus::NeedsManualPreparation);
    }

    #[test]
    fn test_prep_after_manual_fix() {
        let dir = TempDir::new().unwrap();
        let mut ctx = init(dir.path(), "Review").unwrap();
        seed(&mut ctx, vec![imported("Lee2021", "PLATFORM GOVERNANCE IN ECOSYSTEMS")]);
        prep(&mut ctx, None).unwrap();

        let mut records = ctx.load_records().unwrap();
        records
            .get_mut("Lee2021")
            .unwrap()
            .insert_field("title", "Platform governance in ecosystems");
        ctx.save_records(&mut records).unwrap();

        let report = prep(&mut ctx, Some("Lee2021")).unwrap();
        assert_eq!(report.prepared, vec!["Lee2021".to_string()]);
        assert_eq!(ctx.load_records().unwrap()["Lee2021"].status, RecordStatus::Prepared);
    }
}
