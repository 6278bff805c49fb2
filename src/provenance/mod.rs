// src/provenance/mod.rs

//! Field-level provenance tracking
//!
//! Every tracked field carries a provenance entry naming the source(s) that
//! set its current value and classification notes (`missing`,
//! `mostly-all-caps`, `not-missing`, ...). Masterdata fields are tracked in
//! `masterdata_provenance`, everything else in `data_provenance`.
//!
//! All value changes to main records go through [`ProvenanceTracker::update_field`],
//! which enforces:
//! - curated exceptions (`not-missing` from the curation source) are never filled
//! - values equal after cosmetic normalization cause no churn
//! - curated sources are only overwritten by the same curated source

mod priority;

pub use priority::{CURATED_PREFIX, SourcePriority};

use crate::record::{Record, UNKNOWN, source_prefix};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Source tag of curation restrictions
pub const CURATION_RESTRICTIONS: &str = "colrev_curation.masterdata_restrictions";

/// Note: field is deliberately absent (curated exception)
pub const NOTE_NOT_MISSING: &str = "not-missing";
/// Note: required field is absent
pub const NOTE_MISSING: &str = "missing";
/// Note: value is mostly upper-case
pub const NOTE_MOSTLY_ALL_CAPS: &str = "mostly-all-caps";
/// Note: year is not a 4-digit year
pub const NOTE_YEAR_FORMAT: &str = "year-format";

/// Notes that block a record from entering `prepared`
pub const DEFECT_NOTES: &[&str] = &[NOTE_MISSING, NOTE_MOSTLY_ALL_CAPS, NOTE_YEAR_FORMAT];

/// Provenance annotation for one field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceEntry {
    /// Sources that set the current value (usually one origin)
    pub sources: Vec<String>,
    /// Classification notes
    pub notes: Vec<String>,
}

impl ProvenanceEntry {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            sources: vec![source.into()],
            notes: Vec::new(),
        }
    }

    /// Primary source (first listed)
    pub fn source(&self) -> Option<&str> {
        self.sources.first().map(String::as_str)
    }

    pub fn has_note(&self, note: &str) -> bool {
        self.notes.iter().any(|n| n == note)
    }

    pub fn add_note(&mut self, note: &str) -> bool {
        if self.has_note(note) {
            return false;
        }
        self.notes.push(note.to_string());
        true
    }

    pub fn remove_note(&mut self, note: &str) -> bool {
        let before = self.notes.len();
        self.notes.retain(|n| n != note);
        before != self.notes.len()
    }

    /// Curated exception: field deliberately absent per curation restrictions
    pub fn is_curated_exception(&self) -> bool {
        self.source() == Some(CURATION_RESTRICTIONS) && self.has_note(NOTE_NOT_MISSING)
    }

    /// Notes that describe a quality defect
    pub fn defects(&self) -> impl Iterator<Item = &str> {
        self.notes
            .iter()
            .map(String::as_str)
            .filter(|n| DEFECT_NOTES.contains(n))
    }
}

/// Field name -> provenance entry (sorted for stable serialization)
pub type ProvenanceMap = BTreeMap<String, ProvenanceEntry>;

/// Options for a single field update
#[derive(Debug, Clone, Copy)]
pub struct UpdateOptions {
    /// Keep the existing provenance if the value is equivalent
    pub keep_source_if_equal: bool,
    /// Append the source instead of replacing it
    pub append_edit: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            keep_source_if_equal: true,
            append_edit: false,
        }
    }
}

/// Outcome of a field update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldUpdate {
    /// Value was set or replaced
    Set,
    /// Equivalent value (or provenance-only refresh that changed nothing)
    Unchanged,
    /// Provenance source refreshed, value untouched
    SourceRefreshed,
    /// Update refused
    Rejected(RejectReason),
}

impl FieldUpdate {
    pub fn changed(&self) -> bool {
        matches!(self, FieldUpdate::Set | FieldUpdate::SourceRefreshed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Field marked `not-missing` by the curation source
    CuratedException,
    /// Field set by a curated source; update came from elsewhere
    CuratedSource { current: String },
    /// Would replace a known value with UNKNOWN
    UnknownOverKnown,
}

/// Normalize cosmetic differences before comparing values
///
/// Treats ` - ` and `: ` as interchangeable subtitle separators and
/// collapses runs of whitespace.
pub fn normalize_value(value: &str) -> String {
    value
        .replace(" - ", ": ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether two values are equivalent modulo cosmetic normalization
pub fn equivalent(a: &str, b: &str) -> bool {
    a == b || normalize_value(a) == normalize_value(b)
}

/// Applies field updates to records while maintaining provenance
#[derive(Debug, Clone, Default)]
pub struct ProvenanceTracker {
    priority: SourcePriority,
}

impl ProvenanceTracker {
    pub fn new(priority: SourcePriority) -> Self {
        Self { priority }
    }

    pub fn priority(&self) -> &SourcePriority {
        &self.priority
    }

    /// Update one field of a record
    pub fn update_field(
        &self,
        record: &mut Record,
        field: &str,
        value: &str,
        source: &str,
        options: UpdateOptions,
    ) -> FieldUpdate {
        let current = record.get(field).map(str::to_string);

        // Equivalent values never churn
        if let Some(current) = current.as_deref()
            && options.keep_source_if_equal
            && equivalent(current, value)
        {
            return FieldUpdate::Unchanged;
        }

        let is_unknown = current.as_deref().is_none_or(|v| v == UNKNOWN);

        if is_unknown {
            if let Some(prov) = record.provenance(field)
                && prov.is_curated_exception()
            {
                debug!(record = %record.id, field, "curated not-missing exception, skipping update");
                return FieldUpdate::Rejected(RejectReason::CuratedException);
            }
            if value == UNKNOWN && current.is_some() {
                return FieldUpdate::Unchanged;
            }
        } else {
            if value == UNKNOWN {
                return FieldUpdate::Rejected(RejectReason::UnknownOverKnown);
            }
            if let Some(current_source) = record.provenance(field).and_then(|p| p.source())
                && self.priority.is_curated(source_prefix(current_source))
                && source_prefix(current_source) != source_prefix(source)
            {
                return FieldUpdate::Rejected(RejectReason::CuratedSource {
                    current: current_source.to_string(),
                });
            }
            if let Some(current) = current.as_deref()
                && equivalent(current, value)
            {
                // keep_source_if_equal is false here: refresh provenance only
                let entry = record.provenance_entry(field);
                if entry.sources.len() == 1 && entry.source() == Some(source) {
                    return FieldUpdate::Unchanged;
                }
                entry.sources = vec![source.to_string()];
                record.mark_dirty();
                return FieldUpdate::SourceRefreshed;
            }
        }

        record.insert_field(field, value);
        let entry = record.provenance_entry(field);
        if options.append_edit && !is_unknown {
            if !entry.sources.iter().any(|s| s == source) {
                entry.sources.push(source.to_string());
            }
        } else {
            entry.sources = vec![source.to_string()];
        }
        if value != UNKNOWN {
            entry.remove_note(NOTE_MISSING);
        }
        record.mark_dirty();

        debug!(record = %record.id, field, source, "field updated");
        FieldUpdate::Set
    }

    /// Whether `incoming` may replace a value currently attributed to `current`
    ///
    /// Curated sources always win; otherwise the source listed earlier in the
    /// priority list wins (unlisted sources by prefix order), and a source may
    /// always update its own values.
    pub fn outranks(&self, incoming: &str, current: &str) -> bool {
        let incoming = source_prefix(incoming);
        let current = source_prefix(current);
        incoming == current
            || self.priority.compare(incoming, current) != std::cmp::Ordering::Greater
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    fn record_with(field: &str, value: &str, source: &str) -> Record {
        let mut record = Record::new("Smith2020", "article");
        record.insert_field(field, value);
        record.provenance_entry(field).sources = vec![source.to_string()];
        record.mark_clean();
        record
    }

    #[test]
    fn test_fill_unknown_field() {
        let tracker = ProvenanceTracker::default();
        let mut record = record_with("volume", UNKNOWN, "litrev/prep");
        record.provenance_entry("volume").add_note(NOTE_MISSING);

        let result =
            tracker.update_field(&mut record, "volume", "12", "crossref/1", UpdateOptions::default());
        assert_eq!(result, FieldUpdate::Set);
        assert_eq!(record.get("volume"), Some("12"));
        let prov = record.provenance("volume").unwrap();
        assert_eq!(prov.source(), Some("crossref/1"));
        assert!(!prov.has_note(NOTE_MISSING));
        assert!(record.is_dirty());
    }

    #[test]
    fn test_equal_after_normalization_is_noop() {
        let tracker = ProvenanceTracker::default();
        let mut record = record_with("title", "Theory - A Review", "crossref/1");

        let result = tracker.update_field(
            &mut record,
            "title",
            "Theory:  A Review",
            "pubmed/4",
            UpdateOptions::default(),
        );
        assert_eq!(result, FieldUpdate::Unchanged);
        assert_eq!(record.get("title"), Some("Theory - A Review"));
        assert_eq!(record.provenance("title").unwrap().source(), Some("crossref/1"));
        assert!(!record.is_dirty());
    }

    #[test]
    fn test_unknown_equal_update_no_churn() {
        let tracker = ProvenanceTracker::default();
        let mut record = record_with("number", UNKNOWN, "litrev/prep");
        record.provenance_entry("number").add_note(NOTE_MISSING);

        let result =
            tracker.update_field(&mut record, "number", UNKNOWN, "crossref/1", UpdateOptions::default());
        assert_eq!(result, FieldUpdate::Unchanged);
        assert_eq!(record.get("number"), Some(UNKNOWN));
        assert_eq!(record.provenance("number").unwrap().source(), Some("litrev/prep"));
        assert!(!record.is_dirty());
    }

    #[test]
    fn test_curated_exception_rejected() {
        let tracker = ProvenanceTracker::default();
        let mut record = record_with("number", UNKNOWN, CURATION_RESTRICTIONS);
        record.provenance_entry("number").add_note(NOTE_NOT_MISSING);

        let result =
            tracker.update_field(&mut record, "number", "3", "crossref/1", UpdateOptions::default());
        assert_eq!(result, FieldUpdate::Rejected(RejectReason::CuratedException));
        assert_eq!(record.get("number"), Some(UNKNOWN));
        assert!(!record.is_dirty());
    }

    #[test]
    fn test_curated_source_protected() {
        let tracker = ProvenanceTracker::default();
        let mut record = record_with("title", "Curated Title", "md_curated.bib/000001");

        let result =
            tracker.update_field(&mut record, "title", "Other Title", "crossref/1", UpdateOptions::default());
        assert!(matches!(result, FieldUpdate::Rejected(RejectReason::CuratedSource { .. })));

        let result = tracker.update_field(
            &mut record,
            "title",
            "Corrected Curated Title",
            "md_curated.bib/000001",
            UpdateOptions::default(),
        );
        assert_eq!(result, FieldUpdate::Set);
        assert_eq!(record.get("title"), Some("Corrected Curated Title"));
    }

    #[test]
    fn test_material_change_replaces_source() {
        let tracker = ProvenanceTracker::default();
        let mut record = record_with("journal", "MIS Quarterly", "crossref/1");

        let result = tracker.update_field(
            &mut record,
            "journal",
            "Management Information Systems Quarterly",
            "pubmed/2",
            UpdateOptions::default(),
        );
        assert_eq!(result, FieldUpdate::Set);
        assert_eq!(record.provenance("journal").unwrap().sources, vec!["pubmed/2"]);
    }

    #[test]
    fn test_append_edit_keeps_sources() {
        let tracker = ProvenanceTracker::default();
        let mut record = record_with("pages", "1-10", "crossref/1");

        let options = UpdateOptions {
            keep_source_if_equal: true,
            append_edit: true,
        };
        tracker.update_field(&mut record, "pages", "1--10", "manual", options);
        assert_eq!(record.provenance("pages").unwrap().sources, vec!["crossref/1", "manual"]);
    }

    #[test]
    fn test_source_refresh_without_keep() {
        let tracker = ProvenanceTracker::default();
        let mut record = record_with("year", "2020", "crossref/1");

        let options = UpdateOptions {
            keep_source_if_equal: false,
            append_edit: false,
        };
        let result = tracker.update_field(&mut record, "year", "2020", "pubmed/3", options);
        assert_eq!(result, FieldUpdate::SourceRefreshed);
        assert_eq!(record.get("year"), Some("2020"));
        assert_eq!(record.provenance("year").unwrap().source(), Some("pubmed/3"));
    }

    #[test]
    fn test_unknown_over_known_rejected() {
        let tracker = ProvenanceTracker::default();
        let mut record = record_with("year", "2020", "crossref/1");
        let result =
            tracker.update_field(&mut record, "year", UNKNOWN, "pubmed/3", UpdateOptions::default());
        assert_eq!(result, FieldUpdate::Rejected(RejectReason::UnknownOverKnown));
    }

    #[test]
    fn test_normalize_value() {
        assert_eq!(normalize_value("A - B"), "A: B");
        assert_eq!(normalize_value("  A   B "), "A B");
        assert!(equivalent("Title - Sub", "Title: Sub"));
        assert!(!equivalent("Title", "Other"));
    }
}
