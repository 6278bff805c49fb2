// src/record/mod.rs

//! Bibliographic records
//!
//! A [`Record`] is a mapping of bibliographic fields plus lifecycle metadata:
//! origins linking it to source records, the pipeline status, and per-field
//! provenance. Records are never physically deleted; exclusion states are
//! terminal markers.

mod origin;
mod status;

pub use origin::{Origin, source_prefix};
pub use status::RecordStatus;

use crate::provenance::{ProvenanceEntry, ProvenanceMap};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Sentinel for "not yet known"
pub const UNKNOWN: &str = "UNKNOWN";

/// Year value of accepted but unpublished papers
pub const FORTHCOMING: &str = "forthcoming";

/// Fields subject to identity and quality checks
pub const MASTERDATA_FIELDS: &[&str] = &[
    "author",
    "booktitle",
    "chapter",
    "editor",
    "institution",
    "journal",
    "number",
    "pages",
    "publisher",
    "school",
    "series",
    "title",
    "volume",
    "year",
];

/// Fields that legitimately change at the source over time
pub const TIME_VARIANT_FIELDS: &[&str] = &["cited_by"];

/// Identifier keys that are never reconciled between feed and main records
pub const IDENTIFIER_KEYS: &[&str] = &["id", "curation_id"];

/// Field holding the prescreen exclusion reason
pub const PRESCREEN_EXCLUSION_FIELD: &str = "prescreen_exclusion";

/// Field holding the screening criteria / exclusion reason
pub const SCREENING_CRITERIA_FIELD: &str = "screening_criteria";

pub fn is_masterdata_field(field: &str) -> bool {
    MASTERDATA_FIELDS.contains(&field)
}

pub fn is_time_variant_field(field: &str) -> bool {
    TIME_VARIANT_FIELDS.contains(&field)
}

/// Required masterdata fields for an entry type
pub fn required_fields(entry_type: &str) -> &'static [&'static str] {
    match entry_type.to_ascii_lowercase().as_str() {
        "article" => &["title", "author", "year", "journal"],
        "inproceedings" | "conference" => &["title", "author", "year", "booktitle"],
        "book" => &["title", "author", "year", "publisher"],
        "incollection" | "inbook" => &["title", "author", "year", "booktitle"],
        "phdthesis" | "mastersthesis" => &["title", "author", "year", "school"],
        "techreport" => &["title", "author", "year", "institution"],
        _ => &["title", "author", "year"],
    }
}

/// Whether a year value is a concrete 4-digit year
pub fn is_concrete_year(year: &str) -> bool {
    static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{4}$").unwrap());
    YEAR_RE.is_match(year)
}

/// A bibliographic record with lifecycle metadata
#[derive(Debug, Clone)]
pub struct Record {
    /// Unique id within its record set
    pub id: String,
    /// Entry type (`article`, `inproceedings`, ...)
    pub entry_type: String,
    /// Ordered set of origins
    pub origins: Vec<Origin>,
    /// Pipeline status
    pub status: RecordStatus,
    /// Bibliographic fields
    pub fields: BTreeMap<String, String>,
    /// Provenance of masterdata fields
    pub masterdata_provenance: ProvenanceMap,
    /// Provenance of all other fields
    pub data_provenance: ProvenanceMap,
    dirty: bool,
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.entry_type == other.entry_type
            && self.origins == other.origins
            && self.status == other.status
            && self.fields == other.fields
            && self.masterdata_provenance == other.masterdata_provenance
            && self.data_provenance == other.data_provenance
    }
}

impl Eq for Record {}

impl Record {
    /// Create an empty retrieved record
    pub fn new(id: impl Into<String>, entry_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entry_type: entry_type.into(),
            origins: Vec::new(),
            status: RecordStatus::Retrieved,
            fields: BTreeMap::new(),
            masterdata_provenance: ProvenanceMap::new(),
            data_provenance: ProvenanceMap::new(),
            dirty: false,
        }
    }

    /// Builder-style field setter (no provenance)
    pub fn with_field(mut self, field: &str, value: &str) -> Self {
        self.insert_field(field, value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Field absent or UNKNOWN
    pub fn is_unknown(&self, field: &str) -> bool {
        self.get(field).is_none_or(|v| v == UNKNOWN)
    }

    /// Set a raw field value without touching provenance
    pub fn insert_field(&mut self, field: &str, value: &str) {
        let field = field.to_ascii_lowercase();
        if self.fields.get(&field).map(String::as_str) != Some(value) {
            self.fields.insert(field, value.to_string());
            self.dirty = true;
        }
    }

    /// Remove a field together with its provenance
    pub fn remove_field(&mut self, field: &str) -> Option<String> {
        let removed = self.fields.remove(field);
        let md = self.masterdata_provenance.remove(field).is_some();
        let data = self.data_provenance.remove(field).is_some();
        if removed.is_some() || md || data {
            self.dirty = true;
        }
        removed
    }

    pub fn year(&self) -> Option<&str> {
        self.get("year")
    }

    pub fn title(&self) -> Option<&str> {
        self.get("title")
    }

    /// Provenance entry of a field (masterdata or data map)
    pub fn provenance(&self, field: &str) -> Option<&ProvenanceEntry> {
        if is_masterdata_field(field) {
            self.masterdata_provenance.get(field)
        } else {
            self.data_provenance.get(field)
        }
    }

    /// Mutable provenance entry of a field, created if absent
    pub fn provenance_entry(&mut self, field: &str) -> &mut ProvenanceEntry {
        self.dirty = true;
        let map = if is_masterdata_field(field) {
            &mut self.masterdata_provenance
        } else {
            &mut self.data_provenance
        };
        map.entry(field.to_string()).or_default()
    }

    /// Attribute every field to one source
    pub fn add_provenance_all(&mut self, source: &str) {
        let fields: Vec<String> = self.fields.keys().cloned().collect();
        for field in fields {
            let entry = self.provenance_entry(&field);
            if entry.sources.is_empty() {
                entry.sources.push(source.to_string());
            }
        }
    }

    /// Add a note to a masterdata field, setting it UNKNOWN if absent
    pub fn add_masterdata_note(&mut self, field: &str, note: &str, source: &str) {
        if !self.fields.contains_key(field) {
            self.insert_field(field, UNKNOWN);
        }
        let entry = self.provenance_entry(field);
        if entry.sources.is_empty() {
            entry.sources.push(source.to_string());
        }
        entry.add_note(note);
    }

    /// All quality defects, as (field, note) pairs
    pub fn defects(&self) -> Vec<(String, String)> {
        self.masterdata_provenance
            .iter()
            .chain(self.data_provenance.iter())
            .flat_map(|(field, prov)| prov.defects().map(move |n| (field.clone(), n.to_string())))
            .collect()
    }

    pub fn has_origin(&self, origin: &Origin) -> bool {
        self.origins.contains(origin)
    }

    /// Append an origin, keeping the set ordered and duplicate-free
    pub fn add_origin(&mut self, origin: Origin) -> bool {
        if self.has_origin(&origin) {
            return false;
        }
        self.origins.push(origin);
        self.dirty = true;
        true
    }

    /// Source prefixes of all origins, in origin order
    pub fn origin_prefixes(&self) -> Vec<&str> {
        let mut prefixes: Vec<&str> = Vec::new();
        for origin in &self.origins {
            if !prefixes.contains(&origin.prefix.as_str()) {
                prefixes.push(origin.prefix.as_str());
            }
        }
        prefixes
    }

    /// Signals that the underlying work was retracted
    pub fn is_retracted(&self) -> bool {
        static RETRACT_RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"(?i)^\s*(retracted|retraction(\s+notice)?|withdrawn)\s*(article)?\s*[:\-]").unwrap()
        });

        if let Some(flag) = self.get("retracted")
            && matches!(flag.to_ascii_lowercase().as_str(), "yes" | "true" | "1")
        {
            return true;
        }
        self.title().is_some_and(|t| RETRACT_RE.is_match(t))
    }

    /// Copy suitable for a feed snapshot: raw source data, no pipeline state
    pub fn to_feed_record(&self) -> Record {
        let mut feed = Record::new(self.id.clone(), self.entry_type.clone());
        feed.fields = self.fields.clone();
        feed
    }

    /// Field names, provenance keys excluded
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }
}

/// The main record set, keyed by record id
pub type RecordSet = BTreeMap<String, Record>;

/// Find the main record linked to an origin
pub fn find_by_origin<'a>(records: &'a RecordSet, origin: &Origin) -> Option<&'a Record> {
    records.values().find(|r| r.has_origin(origin))
}

/// Id of the main record linked to an origin
pub fn id_by_origin(records: &RecordSet, origin: &Origin) -> Option<String> {
    find_by_origin(records, origin).map(|r| r.id.clone())
}
