// src/dedupe/collaborator.rs

//! Duplicate-detection collaborators
//!
//! The guard does not score pairs itself. It consumes two interfaces:
//! - [`SimilarityIndex`]: nearest neighbours of a record, with any prior
//!   decision flagged
//! - [`DedupeEngine`]: confidence that two records describe the same work
//!
//! The built-in implementations score with the weighted field similarity in
//! [`crate::similarity`] and consult the persisted [`DecisionStore`].

use crate::dataset::{DEDUPE_DIR, Dataset};
use crate::record::{Record, RecordSet};
use crate::similarity::duplicate_similarity;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File holding explicit decisions and the manual validation list
pub const DECISIONS_FILE: &str = "decisions.json";

/// One neighbour returned by the index
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbour {
    pub id: String,
    pub score: f64,
    /// A non-duplicate decision exists for this pair
    pub known_distinct: bool,
}

/// Confidence that two records are duplicates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub confidence: f64,
    pub non_duplicate: bool,
}

/// Nearest-neighbour lookup over the records eligible for deduplication
pub trait SimilarityIndex {
    /// Neighbours of `record`, best first, at most `limit`
    fn neighbours(&self, record: &Record, limit: usize) -> Result<Vec<Neighbour>>;
}

/// Pairwise duplicate scoring
pub trait DedupeEngine {
    fn compare(&self, a: &Record, b: &Record) -> Result<Verdict>;
}

/// A merge the guard refused, kept for a human to validate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingValidation {
    pub a: String,
    pub b: String,
    pub score: f64,
    pub reason: String,
}

/// Persisted non-duplicate decisions and the manual validation list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionStore {
    #[serde(default)]
    distinct: BTreeSet<(String, String)>,

    #[serde(default)]
    manual_validation: Vec<PendingValidation>,
}

fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

impl DecisionStore {
    pub fn relative_path() -> PathBuf {
        Path::new(DEDUPE_DIR).join(DECISIONS_FILE)
    }

    /// Load the store (empty if nothing was decided yet)
    pub fn load(dataset: &Dataset) -> Result<Self> {
        let path = dataset.root().join(Self::relative_path());
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, dataset: &mut Dataset) -> Result<()> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        dataset.write_file(&Self::relative_path(), json.as_bytes())
    }

    pub fn is_distinct(&self, a: &str, b: &str) -> bool {
        self.distinct.contains(&pair_key(a, b))
    }

    /// Record a non-duplicate decision; returns false if already known
    pub fn mark_distinct(&mut self, a: &str, b: &str) -> bool {
        let inserted = self.distinct.insert(pair_key(a, b));
        if inserted {
            debug!(a, b, "non-duplicate decision recorded");
            self.manual_validation
                .retain(|p| pair_key(&p.a, &p.b) != pair_key(a, b));
        }
        inserted
    }

    pub fn distinct_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.distinct.iter().map(|(a, b)| (a.as_str(), b.as_str()))
    }

    /// Add a refused merge to the validation list (once per pair)
    pub fn flag_for_validation(&mut self, item: PendingValidation) {
        let key = pair_key(&item.a, &item.b);
        if self
            .manual_validation
            .iter()
            .any(|p| pair_key(&p.a, &p.b) == key)
        {
            return;
        }
        self.manual_validation.push(item);
    }

    pub fn manual_validation(&self) -> &[PendingValidation] {
        &self.manual_validation
    }

    /// Drop validation items that mention a record id
    pub fn resolve_validation(&mut self, id: &str) {
        self.manual_validation.retain(|p| p.a != id && p.b != id);
    }
}

/// In-memory index scoring every eligible record with the field similarity
#[derive(Debug, Clone)]
pub struct FieldSimilarityIndex {
    entries: Vec<Record>,
    decisions: DecisionStore,
}

impl FieldSimilarityIndex {
    /// Index the given records
    pub fn build<'a>(records: impl IntoIterator<Item = &'a Record>, decisions: &DecisionStore) -> Self {
        Self {
            entries: records.into_iter().cloned().collect(),
            decisions: decisions.clone(),
        }
    }

    /// Index every record of a set that the predicate accepts
    pub fn from_set(records: &RecordSet, decisions: &DecisionStore, eligible: impl Fn(&Record) -> bool) -> Self {
        Self::build(records.values().filter(|r| eligible(r)), decisions)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SimilarityIndex for FieldSimilarityIndex {
    fn neighbours(&self, record: &Record, limit: usize) -> Result<Vec<Neighbour>> {
        let mut neighbours: Vec<Neighbour> = self
            .entries
            .iter()
            .filter(|other| other.id != record.id)
            .map(|other| Neighbour {
                id: other.id.clone(),
                score: duplicate_similarity(record, other),
                known_distinct: self.decisions.is_distinct(&record.id, &other.id),
            })
            .collect();

        neighbours.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        neighbours.truncate(limit);
        Ok(neighbours)
    }
}

/// Engine reporting the field similarity as its confidence
#[derive(Debug, Clone, Default)]
pub struct FieldSimilarityEngine {
    decisions: DecisionStore,
}

impl FieldSimilarityEngine {
    pub fn new(decisions: &DecisionStore) -> Self {
        Self {
            decisions: decisions.clone(),
        }
    }
}

impl DedupeEngine for FieldSimilarityEngine {
    fn compare(&self, a: &Record, b: &Record) -> Result<Verdict> {
        Ok(Verdict {
            confidence: duplicate_similarity(a, b),
            non_duplicate: self.decisions.is_distinct(&a.id, &b.id),
        })
    }
}
