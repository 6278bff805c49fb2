// src/ops/validate.rs

//! Read-only consistency check of the main record set

use super::ReviewContext;
use crate::provenance::{NOTE_MISSING, NOTE_NOT_MISSING};
use crate::record::{Origin, Record, RecordSet, RecordStatus, UNKNOWN, is_masterdata_field};
use crate::settings::Settings;
use crate::Result;
use std::collections::BTreeMap;
use std::fmt;
use strum_macros::{AsRefStr, Display};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum ViolationKind {
    /// Record key and record id differ
    IdMismatch,
    /// One origin is linked to several records
    SharedOrigin,
    /// Imported record without origins
    NoOrigin,
    /// Origin that does not parse or names an unknown source
    OriginFormat,
    /// Masterdata field without provenance
    ProvenanceCoverage,
    /// Provenance entry for an absent field or kept in the wrong map
    StrayProvenance,
    /// UNKNOWN value carrying a note that does not explain it
    UnknownFieldNote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub record: String,
    pub kind: ViolationKind,
    pub detail: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.record, self.kind, self.detail)
    }
}

fn check_record(record: &Record, settings: &Settings, out: &mut Vec<Violation>) {
    let mut push = |kind, detail: String| {
        out.push(Violation {
            record: record.id.clone(),
            kind,
            detail,
        })
    };

    if record.status >= RecordStatus::Imported && record.origins.is_empty() {
        push(ViolationKind::NoOrigin, "record has no origin".to_string());
    }

    for origin in &record.origins {
        let text = origin.to_string();
        if Origin::parse(&text).is_err() {
            push(ViolationKind::OriginFormat, format!("malformed origin {text}"));
            continue;
        }
        let known = settings.source_by_prefix(&origin.prefix).is_some()
            || settings.project.curated_prefixes.contains(&origin.prefix);
        if !known {
            push(ViolationKind::OriginFormat, format!("origin {text} names no configured source"));
        }
    }

    let stray_provenance = record
        .masterdata_provenance
        .keys()
        .map(|f| (f, true))
        .chain(record.data_provenance.keys().map(|f| (f, false)));
    for (field, masterdata) in stray_provenance {
        if !record.fields.contains_key(field) {
            push(ViolationKind::StrayProvenance, format!("provenance for absent field {field}"));
        } else if masterdata != is_masterdata_field(field) {
            let map = if masterdata { "masterdata" } else { "data" };
            push(ViolationKind::StrayProvenance, format!("{field} tracked as {map} provenance"));
        }
    }

    for (field, value) in &record.fields {
        if is_masterdata_field(field) && !record.masterdata_provenance.contains_key(field) {
            push(ViolationKind::ProvenanceCoverage, format!("{field} has no provenance"));
        }
        if value != UNKNOWN {
            continue;
        }
        let stray: Vec<&str> = record
            .provenance(field)
            .map(|p| {
                p.notes
                    .iter()
                    .map(String::as_str)
                    .filter(|n| *n != NOTE_MISSING && *n != NOTE_NOT_MISSING)
                    .collect()
            })
            .unwrap_or_default();
        if !stray.is_empty() {
            push(
                ViolationKind::UnknownFieldNote,
                format!("{field} is UNKNOWN but noted {}", stray.join(", ")),
            );
        }
    }
}

/// Check every record without modifying anything
pub fn check_records(records: &RecordSet, settings: &Settings) -> Vec<Violation> {
    let mut violations = Vec::new();
    let mut linked: BTreeMap<String, &str> = BTreeMap::new();

    for (key, record) in records {
        if *key != record.id {
            violations.push(Violation {
                record: key.clone(),
                kind: ViolationKind::IdMismatch,
                detail: format!("stored under {key} but id is {}", record.id),
            });
        }
        for origin in &record.origins {
            if let Some(other) = linked.insert(origin.to_string(), &record.id) {
                violations.push(Violation {
                    record: record.id.clone(),
                    kind: ViolationKind::SharedOrigin,
                    detail: format!("{origin} is also linked to {other}"),
                });
            }
        }
        check_record(record, settings, &mut violations);
    }
    violations
}

/// Validate the main record set of a repository
pub fn validate(ctx: &ReviewContext) -> Result<Vec<Violation>> {
    let records = ctx.load_records()?;
    let violations = check_records(&records, &ctx.settings);
    for violation in &violations {
        warn!(record = %violation.record, kind = violation.kind.as_ref(), "{}", violation.detail);
    }
    debug!(records = records.len(), violations = violations.len(), "validation finished");
    Ok(violations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provenance::NOTE_MOSTLY_ALL_CAPS;
    use crate::settings::{SearchSource, SearchType};

    fn settings() -> Settings {
        let mut settings = Settings::new("Review");
        settings.sources.push(SearchSource {
            endpoint: "crossref".into(),
            filename: "data/search/crossref.bib".into(),
            search_type: SearchType::Api,
            source_identifier: "doi".into(),
            origin_prefix: Some("crossref.bib".into()),
            search_parameters: Default::default(),
        });
        settings
    }

    fn record(id: &str, local: &str) -> Record {
        let mut record = Record::new(id, "article")
            .with_field("title", "A study")
            .with_field("year", "2020");
        record.add_origin(Origin::new("crossref.bib", local));
        record.add_provenance_all(&format!("crossref.bib/{local}"));
        record.status = RecordStatus::Imported;
        record
    }

    fn set(records: Vec<Record>) -> RecordSet {
        records.into_iter().map(|r| (r.id.clone(), r)).collect()
    }

    #[test]
    fn test_clean_set() {
        let records = set(vec![record("A", "000001"), record("B", "000002")]);
        assert!(check_records(&records, &settings()).is_empty());
    }

    #[test]
    fn test_violations_reported() {
        let mut uncovered = record("A", "000001");
        uncovered.insert_field("journal", "MIS Quarterly");
        uncovered.masterdata_provenance.remove("journal");

        let mut noted = record("B", "000002");
        noted.insert_field("volume", UNKNOWN);
        noted.provenance_entry("volume").add_note(NOTE_MOSTLY_ALL_CAPS);

        let shared = record("C", "000001");

        let mut foreign = record("D", "000004");
        foreign.add_origin(Origin::new("unknown.bib", "000001"));

        let violations = check_records(&set(vec![uncovered, noted, shared, foreign]), &settings());
        let kinds: Vec<(&str, ViolationKind)> = violations
            .iter()
            .map(|v| (v.record.as_str(), v.kind))
            .collect();
        assert!(kinds.contains(&("A", ViolationKind::ProvenanceCoverage)));
        assert!(kinds.contains(&("B", ViolationKind::UnknownFieldNote)));
        assert!(kinds.contains(&("C", ViolationKind::SharedOrigin)));
        assert!(kinds.contains(&("D", ViolationKind::OriginFormat)));
        assert_eq!(violations.len(), 4);
    }

    #[test]
    fn test_provenance_without_field_reported() {
        let mut orphaned = record("A", "000001");
        orphaned.fields.remove("year");

        let mut misfiled = record("B", "000002").with_field("doi", "10.1/b");
        let entry = crate::provenance::ProvenanceEntry::new("crossref.bib/000002");
        misfiled.masterdata_provenance.insert("doi".into(), entry);

        let violations = check_records(&set(vec![orphaned, misfiled]), &settings());
        let stray: Vec<(&str, &str)> = violations
            .iter()
            .filter(|v| v.kind == ViolationKind::StrayProvenance)
            .map(|v| (v.record.as_str(), v.detail.as_str()))
            .collect();
        assert_eq!(
            stray,
            vec![
                ("A", "provenance for absent field year"),
                ("B", "doi tracked as masterdata provenance"),
            ]
        );
    }

    #[test]
    fn test_violation_display() {
        let violation = Violation {
            record: "A".into(),
            kind: ViolationKind::NoOrigin,
            detail: "record has no origin".into(),
        };
        assert_eq!(violation.to_string(), "A [no-origin] record has no origin");
    }
}
