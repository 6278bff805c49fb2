// src/ops/stats.rs

//! Status statistics (PRISMA-style flow numbers)

use super::ReviewContext;
use crate::record::{PRESCREEN_EXCLUSION_FIELD, RecordSet, RecordStatus, SCREENING_CRITERIA_FIELD};
use crate::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use strum::IntoEnumIterator;

/// Records that reached at least a given stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlowCounts {
    /// Feed records linked to the main set
    pub retrieved: usize,
    pub deduplicated: usize,
    pub prescreened: usize,
    pub prescreen_included: usize,
    pub screened: usize,
    pub included: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusStats {
    /// Record count per status (every status listed)
    pub per_state: BTreeMap<String, usize>,
    pub flow: FlowCounts,
    pub exclusion_reasons: BTreeMap<String, usize>,
    /// Origins merged away during deduplication
    pub duplicates_removed: usize,
    /// Records waiting for a curator
    pub needs_manual: usize,
    /// Every record reached a terminal state
    pub completed: bool,
}

impl StatusStats {
    pub fn from_records(records: &RecordSet) -> Self {
        let mut stats = StatusStats {
            per_state: RecordStatus::iter().map(|s| (s.to_string(), 0)).collect(),
            ..Default::default()
        };

        let origins: usize = records.values().map(|r| r.origins.len()).sum();
        stats.flow.retrieved = origins;

        for record in records.values() {
            let status = record.status;
            *stats.per_state.entry(status.to_string()).or_default() += 1;

            let flow = &mut stats.flow;
            if status.is_resolved() {
                flow.deduplicated += 1;
                // Duplicates merged into this record
                stats.duplicates_removed += record.origins.len().saturating_sub(1);
            }
            if status >= RecordStatus::PrescreenExcluded {
                flow.prescreened += 1;
            }
            if status >= RecordStatus::PrescreenIncluded {
                flow.prescreen_included += 1;
            }
            if status >= RecordStatus::Excluded {
                flow.screened += 1;
            }
            if status >= RecordStatus::Included {
                flow.included += 1;
            }
            if status.needs_manual() {
                stats.needs_manual += 1;
            }

            let reason = match status {
                RecordStatus::PrescreenExcluded => record.get(PRESCREEN_EXCLUSION_FIELD),
                RecordStatus::Excluded => record.get(SCREENING_CRITERIA_FIELD),
                RecordStatus::PdfNotAvailable => Some("pdf not available"),
                _ => None,
            };
            if let Some(reason) = reason {
                *stats.exclusion_reasons.entry(reason.to_string()).or_default() += 1;
            }
        }

        stats.completed = !records.is_empty() && records.values().all(|r| r.status.is_terminal());
        stats
    }

    pub fn total(&self) -> usize {
        self.per_state.values().sum()
    }
}

/// Statistics of the main record set
pub fn stats(ctx: &ReviewContext) -> Result<StatusStats> {
    Ok(StatusStats::from_records(&ctx.load_records()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Origin, Record};

    fn record(id: &str, status: RecordStatus, origins: usize) -> Record {
        let mut record = Record::new(id, "article");
        for n in 0..origins {
            record.add_origin(Origin::new(format!("source{n}"), id));
        }
        record.status = status;
        record
    }

    #[test]
    fn test_flow_counts() {
        let records: RecordSet = [
            record("A", RecordStatus::Prepared, 1),
            record("B", RecordStatus::Processed, 2),
            record("C", RecordStatus::PrescreenExcluded, 1)
                .with_field(PRESCREEN_EXCLUSION_FIELD, "retracted"),
            record("D", RecordStatus::Included, 3),
        ]
        .into_iter()
        .map(|r| (r.id.clone(), r))
        .collect();

        let stats = StatusStats::from_records(&records);
        assert_eq!(stats.total(), 4);
        assert_eq!(stats.per_state["md_prepared"], 1);
        assert_eq!(stats.per_state["rev_synthesized"], 0);
        assert_eq!(
            stats.flow,
            FlowCounts {
                retrieved: 7,
                deduplicated: 3,
                prescreened: 2,
                prescreen_included: 1,
                screened: 1,
                included: 1,
            }
        );
        assert_eq!(stats.duplicates_removed, 3);
        assert_eq!(stats.exclusion_reasons["retracted"], 1);
        assert!(!stats.completed);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["flow"]["included"], 1);
    }

    #[test]
    fn test_completed() {
        let records: RecordSet = [record("A", RecordStatus::Synthesized, 1)]
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();
        assert!(StatusStats::from_records(&records).completed);
        assert!(!StatusStats::from_records(&RecordSet::new()).completed);
    }
}
