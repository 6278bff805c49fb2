// src/bib/mod.rs

//! Record snapshot format
//!
//! Main and feed snapshots share one textual BibTeX-style format. Main
//! snapshots carry lifecycle state in reserved keys:
//!
//! ```text
//! @article{Smith2020,
//!   colrev_origin                 = {crossref.bib/000001;pubmed.bib/000004},
//!   colrev_status                 = {md_processed},
//!   colrev_masterdata_provenance  = {author:crossref.bib/000001;
//!                                    year:crossref.bib/000001;},
//!   title                         = {...},
//! }
//! ```
//!
//! Feed snapshots hold raw source data only and omit the reserved keys.

mod parser;
mod writer;

pub use parser::{RawEntry, parse_entries};
pub use writer::{write_entry, write_records};

use crate::provenance::{ProvenanceEntry, ProvenanceMap};
use crate::record::{Origin, Record, RecordSet, RecordStatus, is_masterdata_field};
use crate::{Error, Result};

pub const ORIGIN_KEY: &str = "colrev_origin";
pub const STATUS_KEY: &str = "colrev_status";
pub const MASTERDATA_PROVENANCE_KEY: &str = "colrev_masterdata_provenance";
pub const DATA_PROVENANCE_KEY: &str = "colrev_data_provenance";

/// Keys that hold lifecycle state rather than bibliographic data
pub const RESERVED_KEYS: &[&str] = &[
    ORIGIN_KEY,
    STATUS_KEY,
    MASTERDATA_PROVENANCE_KEY,
    DATA_PROVENANCE_KEY,
];

/// Which flavour of snapshot is being written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    /// Main record set: origins, status and provenance included
    Main,
    /// Source feed: raw fields only
    Feed,
}

/// Parse a rendered provenance value
pub fn parse_provenance(value: &str) -> std::result::Result<ProvenanceMap, String> {
    let mut map = ProvenanceMap::new();
    for line in value.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let (field, rest) = line
            .split_once(':')
            .ok_or_else(|| format!("malformed provenance entry '{line}'"))?;
        let (sources, notes) = rest.rsplit_once(';').unwrap_or((rest, ""));
        let split = |s: &str| -> Vec<String> {
            s.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        };
        map.insert(
            field.trim().to_string(),
            ProvenanceEntry {
                sources: split(sources),
                notes: split(notes),
            },
        );
    }
    Ok(map)
}

/// Convert a raw entry into a record
pub fn record_from_entry(entry: RawEntry, file: &str) -> Result<Record> {
    let parse_err = |message: String| Error::Parse {
        file: file.to_string(),
        line: entry.line,
        message,
    };

    let mut record = Record::new(entry.id.clone(), entry.entry_type.clone());
    for (key, value) in &entry.fields {
        match key.as_str() {
            ORIGIN_KEY => {
                for origin in value.split(';').map(str::trim).filter(|o| !o.is_empty()) {
                    let origin = Origin::parse(origin).map_err(|e| parse_err(e.to_string()))?;
                    record.add_origin(origin);
                }
            }
            STATUS_KEY => {
                record.status = RecordStatus::parse(value.trim()).map_err(|e| parse_err(e.to_string()))?;
            }
            MASTERDATA_PROVENANCE_KEY | DATA_PROVENANCE_KEY => {
                let map = parse_provenance(value).map_err(parse_err)?;
                for (field, prov) in map {
                    let masterdata = key == MASTERDATA_PROVENANCE_KEY;
                    if masterdata != is_masterdata_field(&field) {
                        return Err(parse_err(format!("provenance for '{field}' stored under {key}")));
                    }
                    if masterdata {
                        record.masterdata_provenance.insert(field, prov);
                    } else {
                        record.data_provenance.insert(field, prov);
                    }
                }
            }
            _ => record.insert_field(key, value),
        }
    }
    record.mark_clean();
    Ok(record)
}

/// Parse a snapshot into a record set keyed by id
pub fn records_from_str(text: &str, file: &str) -> Result<RecordSet> {
    let mut records = RecordSet::new();
    for entry in parse_entries(text, file)? {
        let line = entry.line;
        let record = record_from_entry(entry, file)?;
        if records.contains_key(&record.id) {
            return Err(Error::Parse {
                file: file.to_string(),
                line,
                message: format!("duplicate id '{}'", record.id),
            });
        }
        records.insert(record.id.clone(), record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = "\
@article{Smith2020,
  colrev_origin                 = {crossref.bib/000001;pubmed.bib/000004},
  colrev_status                 = {md_processed},
  colrev_masterdata_provenance  = {author:crossref.bib/000001;
                                   number:colrev_curation.masterdata_restrictions;not-missing
                                   title:crossref.bib/000001,manual;mostly-all-caps},
  colrev_data_provenance        = {doi:crossref.bib/000001;},
  author                        = {Smith, John},
  doi                           = {10.1/x},
  number                        = {UNKNOWN},
  title                         = {A STUDY OF {THINGS}},
}

@inproceedings{Wu2021,
  colrev_origin                 = {pubmed.bib/000002},
  colrev_status                 = {md_prepared},
  abstract                      = {first line
    second line},
}
";

    #[test]
    fn test_decode_snapshot() {
        let records = records_from_str(SNAPSHOT, "records.bib").unwrap();
        let smith = &records["Smith2020"];
        assert_eq!(smith.origins.len(), 2);
        assert_eq!(smith.status, RecordStatus::Processed);
        assert_eq!(smith.get("title"), Some("A STUDY OF {THINGS}"));
        let number = smith.provenance("number").unwrap();
        assert!(number.is_curated_exception());
        let title = smith.provenance("title").unwrap();
        assert_eq!(title.sources, vec!["crossref.bib/000001", "manual"]);
        assert_eq!(title.notes, vec!["mostly-all-caps"]);
        assert!(!smith.is_dirty());
    }

    #[test]
    fn test_roundtrip_is_byte_stable() {
        let records = records_from_str(SNAPSHOT, "records.bib").unwrap();
        let written = write_records(records.values(), SnapshotKind::Main);
        assert_eq!(written, SNAPSHOT);
    }

    #[test]
    fn test_misplaced_provenance_rejected() {
        let text = "@misc{a,\n  colrev_data_provenance = {title:x/1;},\n}\n";
        assert!(records_from_str(text, "records.bib").is_err());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let text = "@misc{a, title = {A}}\n@misc{a, title = {B}}\n";
        let err = records_from_str(text, "records.bib").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_invalid_status_names_line() {
        let text = "\n@misc{a,\n  colrev_status = {md_bogus},\n}\n";
        let err = records_from_str(text, "records.bib").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
