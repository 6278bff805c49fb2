// src/sources/mod.rs

//! Search-source endpoints
//!
//! Each `[[sources]]` entry in the settings names an endpoint key. The key
//! is resolved through an [`EndpointRegistry`] that is filled explicitly at
//! construction; there is no discovery by name at runtime.

mod bibtex;
mod crossref;

pub use bibtex::BibtexEndpoint;
pub use crossref::{CrossrefEndpoint, parse_works};

use crate::record::{FORTHCOMING, Record};
use crate::settings::SearchSource;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// One kind of search source
pub trait SearchEndpoint: Send + Sync {
    /// Key used in the settings (`endpoint = "..."`)
    fn key(&self) -> &str;

    /// Whether the endpoint queries a remote API (as opposed to a file)
    fn api_search_supported(&self) -> bool;

    /// Check the source's parameters before a search runs
    fn validate_source(&self, source: &SearchSource) -> Result<()>;

    /// Retrieve the source's current records
    ///
    /// `root` is the repository root; `rerun` asks for a full retrieval
    /// instead of an incremental one.
    fn run_search(&self, source: &SearchSource, root: &Path, rerun: bool) -> Result<Vec<Record>>;
}

/// Endpoints by key
pub struct EndpointRegistry {
    endpoints: BTreeMap<String, Box<dyn SearchEndpoint>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self {
            endpoints: BTreeMap::new(),
        }
    }

    /// Registry with the `bibtex` and `crossref` endpoints
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(BibtexEndpoint));
        registry.register(Box::new(CrossrefEndpoint::default()));
        registry
    }

    /// Add an endpoint, replacing one with the same key
    pub fn register(&mut self, endpoint: Box<dyn SearchEndpoint>) {
        self.endpoints.insert(endpoint.key().to_lowercase(), endpoint);
    }

    pub fn get(&self, key: &str) -> Result<&dyn SearchEndpoint> {
        self.endpoints
            .get(&key.to_lowercase())
            .map(|e| e.as_ref())
            .ok_or_else(|| Error::UnknownEndpoint(key.to_string()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }
}

impl Default for EndpointRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Feed filename for a new source that collides with no existing one
///
/// `name` is sanitized (`+` and spaces become `_`); collisions get `_1`,
/// `_2`, ... suffixes.
pub fn unique_filename(name: &str, existing: &[SearchSource]) -> PathBuf {
    let stem = name.replace(['+', ' '], "_");
    let stem = stem.strip_suffix(".bib").unwrap_or(&stem);
    let taken = |candidate: &Path| existing.iter().any(|s| s.filename == candidate);

    let filename = PathBuf::from(format!("{}/{stem}.bib", crate::dataset::SEARCH_DIR));
    if !taken(&filename) {
        return filename;
    }
    (1..)
        .map(|i| PathBuf::from(format!("{}/{stem}_{i}.bib", crate::dataset::SEARCH_DIR)))
        .find(|candidate| !taken(candidate))
        .unwrap_or(filename)
}

/// Drop forthcoming records from fresh search results
pub fn drop_forthcoming(records: Vec<Record>) -> Vec<Record> {
    let before = records.len();
    let kept: Vec<Record> = records
        .into_iter()
        .filter(|r| r.year() != Some(FORTHCOMING))
        .collect();
    let removed = before - kept.len();
    if removed > 0 {
        info!(removed, "forthcoming records removed");
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SearchType;

    fn source(filename: &str) -> SearchSource {
        SearchSource {
            endpoint: "bibtex".into(),
            filename: filename.into(),
            search_type: SearchType::Db,
            source_identifier: "doi".into(),
            origin_prefix: None,
            search_parameters: BTreeMap::new(),
        }
    }

    #[test]
    fn test_registry_lookup() {
        let registry = EndpointRegistry::with_builtins();
        assert_eq!(registry.keys().collect::<Vec<_>>(), vec!["bibtex", "crossref"]);
        assert!(registry.get("Crossref").unwrap().api_search_supported());
        assert!(!registry.get("bibtex").unwrap().api_search_supported());
        assert!(matches!(registry.get("scopus"), Err(Error::UnknownEndpoint(_))));
    }

    #[test]
    fn test_unique_filename() {
        let existing = vec![
            source("data/search/wos.bib"),
            source("data/search/wos_1.bib"),
        ];
        assert_eq!(unique_filename("scopus", &existing), PathBuf::from("data/search/scopus.bib"));
        assert_eq!(unique_filename("wos.bib", &existing), PathBuf::from("data/search/wos_2.bib"));
        assert_eq!(
            unique_filename("web of science", &existing),
            PathBuf::from("data/search/web_of_science.bib")
        );
    }

    #[test]
    fn test_drop_forthcoming() {
        let records = vec![
            Record::new("1", "article").with_field("year", "2020"),
            Record::new("2", "article").with_field("year", FORTHCOMING),
        ];
        let kept = drop_forthcoming(records);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "1");
    }
}
