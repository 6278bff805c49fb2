// src/quality/mod.rs

//! Masterdata quality model
//!
//! A chain of checkers that annotate masterdata provenance with defect notes.
//! Defect notes are recomputed from scratch on every run so that fixing a
//! field clears its note. Curated `not-missing` exceptions are never flagged.

use crate::provenance::{DEFECT_NOTES, NOTE_MISSING, NOTE_MOSTLY_ALL_CAPS, NOTE_YEAR_FORMAT};
use crate::record::{FORTHCOMING, Record, UNKNOWN, is_concrete_year, required_fields};
use tracing::debug;

/// Provenance source attributed to fields the quality model creates
pub const QUALITY_SOURCE: &str = "litrev/prep";

/// A quality check that annotates a record
pub trait QualityChecker: Send + Sync {
    /// Checker name for logging
    fn name(&self) -> &str;

    /// Add defect notes to the record
    fn run(&self, record: &mut Record);
}

/// Required masterdata fields must be present and known
pub struct MissingFieldChecker;

impl QualityChecker for MissingFieldChecker {
    fn name(&self) -> &str {
        "missing-field"
    }

    fn run(&self, record: &mut Record) {
        for field in required_fields(&record.entry_type) {
            if !record.is_unknown(field) {
                continue;
            }
            if record.provenance(field).is_some_and(|p| p.is_curated_exception()) {
                continue;
            }
            record.add_masterdata_note(field, NOTE_MISSING, QUALITY_SOURCE);
        }
    }
}

/// Fields written mostly in upper case
pub struct MostlyAllCapsChecker;

const CAPS_FIELDS: &[&str] = &["author", "title", "journal", "booktitle", "editor"];
const CONTAINER_FIELDS: &[&str] = &["journal", "booktitle"];
const CAPS_THRESHOLD: f64 = 0.7;

/// Share of upper-case characters, ignoring separators
pub fn percent_upper_chars(value: &str) -> f64 {
    let chars: Vec<char> = value
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
        .collect();
    if chars.is_empty() {
        return 0.0;
    }
    chars.iter().filter(|c| c.is_uppercase()).count() as f64 / chars.len() as f64
}

impl QualityChecker for MostlyAllCapsChecker {
    fn name(&self) -> &str {
        "mostly-all-caps"
    }

    fn run(&self, record: &mut Record) {
        for field in CAPS_FIELDS {
            let Some(value) = record.get(field) else {
                continue;
            };
            if value == UNKNOWN || percent_upper_chars(&value.replace(" and ", "")) < CAPS_THRESHOLD {
                continue;
            }
            // Abbreviated container titles
            if CONTAINER_FIELDS.contains(field) && value.chars().count() < 6 {
                continue;
            }
            record.add_masterdata_note(field, NOTE_MOSTLY_ALL_CAPS, QUALITY_SOURCE);
        }
    }
}

/// Year must be a 4-digit year (or forthcoming)
pub struct YearFormatChecker;

impl QualityChecker for YearFormatChecker {
    fn name(&self) -> &str {
        "year-format"
    }

    fn run(&self, record: &mut Record) {
        let Some(year) = record.year() else {
            return;
        };
        if year == UNKNOWN || year == FORTHCOMING || is_concrete_year(year) {
            return;
        }
        record.add_masterdata_note("year", NOTE_YEAR_FORMAT, QUALITY_SOURCE);
    }
}

/// Ordered chain of quality checkers
pub struct QualityModel {
    checkers: Vec<Box<dyn QualityChecker>>,
}

impl QualityModel {
    pub fn new() -> Self {
        Self { checkers: Vec::new() }
    }

    /// Model with the built-in checkers registered
    pub fn with_builtins() -> Self {
        let mut model = Self::new();
        model.register(Box::new(MissingFieldChecker));
        model.register(Box::new(MostlyAllCapsChecker));
        model.register(Box::new(YearFormatChecker));
        model
    }

    pub fn register(&mut self, checker: Box<dyn QualityChecker>) {
        self.checkers.push(checker);
    }

    pub fn checker_names(&self) -> Vec<&str> {
        self.checkers.iter().map(|c| c.name()).collect()
    }

    /// Recompute defect notes; returns the defects found
    pub fn run(&self, record: &mut Record) -> Vec<(String, String)> {
        let stale: Vec<String> = record
            .masterdata_provenance
            .iter()
            .filter(|(_, prov)| prov.defects().next().is_some())
            .map(|(field, _)| field.clone())
            .collect();
        for field in stale {
            let entry = record.provenance_entry(&field);
            for note in DEFECT_NOTES {
                entry.remove_note(note);
            }
        }

        for checker in &self.checkers {
            checker.run(record);
        }

        let defects = record.defects();
        if !defects.is_empty() {
            debug!(record = %record.id, ?defects, "quality defects");
        }
        defects
    }
}

impl Default for QualityModel {
    fn default() -> Self {
        Self::with_builtins()
    }
}
