// src/similarity.rs

//! Record similarity and field-level diffs
//!
//! Two scores are provided:
//! - [`change_similarity`]: how much a source record changed between two
//!   retrieval runs (all non-time-variant fields, unweighted)
//! - [`duplicate_similarity`]: how likely two records describe the same work
//!   (weighted masterdata comparison)

use crate::record::{FORTHCOMING, Record, UNKNOWN, is_concrete_year, is_time_variant_field};
use std::collections::BTreeSet;
use std::fmt;

/// Change-similarity above which an update counts as routine
pub const ROUTINE_CHANGE_THRESHOLD: f64 = 0.98;

/// One field-level difference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: String,
    pub old: Option<String>,
    pub new: Option<String>,
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.old, &self.new) {
            (Some(old), Some(new)) => write!(f, "{}: {} -> {}", self.field, old, new),
            (None, Some(new)) => write!(f, "{}: (added) {}", self.field, new),
            (Some(old), None) => write!(f, "{}: (removed) {}", self.field, old),
            (None, None) => write!(f, "{}: (unchanged)", self.field),
        }
    }
}

/// Field-level diff from `old` to `new`, time-variant fields excluded
pub fn diff(old: &Record, new: &Record) -> Vec<FieldChange> {
    compared_fields(old, new)
        .into_iter()
        .filter_map(|field| {
            let a = old.get(field);
            let b = new.get(field);
            (a != b).then(|| FieldChange {
                field: field.to_string(),
                old: a.map(str::to_string),
                new: b.map(str::to_string),
            })
        })
        .collect()
}

fn compared_fields<'a>(a: &'a Record, b: &'a Record) -> BTreeSet<&'a str> {
    a.field_names()
        .chain(b.field_names())
        .filter(|f| !is_time_variant_field(f))
        .collect()
}

/// Mean per-field similarity of two versions of a source record
pub fn change_similarity(old: &Record, new: &Record) -> f64 {
    let fields = compared_fields(old, new);
    if fields.is_empty() {
        return 1.0;
    }
    let total: f64 = fields
        .iter()
        .map(|field| match (old.get(field), new.get(field)) {
            (Some(a), Some(b)) => strsim::normalized_levenshtein(a, b),
            _ => 0.0,
        })
        .sum();
    total / fields.len() as f64
}

/// Lowercase alphanumerics with single spaces
pub fn normalize_for_matching(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn container(record: &Record) -> Option<&str> {
    record
        .get("journal")
        .or_else(|| record.get("booktitle"))
        .filter(|v| *v != UNKNOWN)
}

fn known<'a>(record: &'a Record, field: &str) -> Option<&'a str> {
    record.get(field).filter(|v| *v != UNKNOWN)
}

/// Surnames of all authors, normalized
fn author_surnames(authors: &str) -> String {
    authors
        .split(" and ")
        .map(|a| a.split(',').next().unwrap_or(a).trim())
        .map(normalize_for_matching)
        .collect::<Vec<_>>()
        .join(" ")
}

const DUPLICATE_WEIGHTS: &[(&str, f64)] = &[
    ("title", 0.45),
    ("author", 0.25),
    ("year", 0.1),
    ("container", 0.1),
    ("volume", 0.05),
    ("pages", 0.05),
];

/// Weighted similarity of two records as potential duplicates
///
/// Fields unknown on either side are left out and the remaining weights
/// renormalized. A shared DOI short-circuits to 1.0.
pub fn duplicate_similarity(a: &Record, b: &Record) -> f64 {
    if let (Some(x), Some(y)) = (known(a, "doi"), known(b, "doi"))
        && x.eq_ignore_ascii_case(y)
    {
        return 1.0;
    }

    let mut score = 0.0;
    let mut weight = 0.0;
    for (field, w) in DUPLICATE_WEIGHTS {
        let pair = match *field {
            "container" => container(a).zip(container(b)),
            _ => known(a, field).zip(known(b, field)),
        };
        let Some((x, y)) = pair else {
            continue;
        };
        let sim = match *field {
            "author" => strsim::normalized_levenshtein(&author_surnames(x), &author_surnames(y)),
            "year" => {
                if x == y {
                    1.0
                } else if x == FORTHCOMING || y == FORTHCOMING {
                    0.8
                } else {
                    0.0
                }
            }
            _ => strsim::normalized_levenshtein(&normalize_for_matching(x), &normalize_for_matching(y)),
        };
        score += sim * w;
        weight += w;
    }

    if weight == 0.0 { 0.0 } else { score / weight }
}

/// Whether the changes between two versions are a forthcoming paper's publication
///
/// Either the year moves from `forthcoming` to a concrete year, or volume and
/// number were both unknown and are now both assigned, with at least one of
/// them changed.
pub fn is_forthcoming_published(old: &Record, new: &Record) -> bool {
    if old.year() == Some(FORTHCOMING) && new.year().is_some_and(is_concrete_year) {
        return true;
    }

    let unknown = |r: &Record, f: &str| r.get(f).is_none_or(|v| v == UNKNOWN);
    unknown(old, "volume")
        && unknown(old, "number")
        && !unknown(new, "volume")
        && !unknown(new, "number")
        && (old.get("volume") != new.get("volume") || old.get("number") != new.get("number"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(fields: &[(&str, &str)]) -> Record {
        let mut record = Record::new("x", "article");
        for (k, v) in fields {
            record.insert_field(k, v);
        }
        record
    }

    #[test]
    fn test_diff_ignores_time_variant() {
        let old = rec(&[("title", "A"), ("cited_by", "3")]);
        let new = rec(&[("title", "B"), ("cited_by", "7"), ("volume", "2")]);
        let changes = diff(&old, &new);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].to_string(), "title: A -> B");
        assert_eq!(changes[1].to_string(), "volume: (added) 2");
    }

    #[test]
    fn test_change_similarity() {
        let old = rec(&[("title", "A study of things"), ("year", "2020")]);
        assert_eq!(change_similarity(&old, &old.clone()), 1.0);

        let new = rec(&[("title", "Something else entirely"), ("year", "2021")]);
        assert!(change_similarity(&old, &new) < ROUTINE_CHANGE_THRESHOLD);
    }

    #[test]
    fn test_duplicate_similarity() {
        let a = rec(&[
            ("title", "Digital platforms: A review"),
            ("author", "Smith, John and Doe, Jane"),
            ("year", "2020"),
            ("journal", "MIS Quarterly"),
        ]);
        let b = rec(&[
            ("title", "Digital Platforms - a Review"),
            ("author", "Smith, J. and Doe, J."),
            ("year", "2020"),
            ("journal", "MIS Quarterly"),
        ]);
        assert!(duplicate_similarity(&a, &b) > 0.95);

        let c = rec(&[("title", "Blockchain governance"), ("author", "Lee, K."), ("year", "2018")]);
        assert!(duplicate_similarity(&a, &c) < 0.5);
    }

    #[test]
    fn test_shared_doi() {
        let a = rec(&[("doi", "10.1/X"), ("title", "A")]);
        let b = rec(&[("doi", "10.1/x"), ("title", "Completely different")]);
        assert_eq!(duplicate_similarity(&a, &b), 1.0);
    }

    #[test]
    fn test_forthcoming_published() {
        let old = rec(&[("year", FORTHCOMING)]);
        let new = rec(&[("year", "2024"), ("volume", "12")]);
        assert!(is_forthcoming_published(&old, &new));

        let old = rec(&[("year", "2024"), ("volume", UNKNOWN), ("number", UNKNOWN)]);
        let new = rec(&[("year", "2024"), ("volume", "12"), ("number", "3")]);
        assert!(is_forthcoming_published(&old, &new));

        let new = rec(&[("year", "2024"), ("volume", "12")]);
        assert!(!is_forthcoming_published(&old, &new));
    }
}
