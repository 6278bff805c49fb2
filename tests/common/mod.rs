// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use litrev::dataset::ChangeLog;
use litrev::ops::{self, ReviewContext};
use litrev::record::{Origin, Record, RecordSet, RecordStatus};
use litrev::settings::{SearchSource, SearchType};
use litrev::sources::{EndpointRegistry, SearchEndpoint};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use tempfile::TempDir;

/// Initialize a review repository in a fresh temporary directory.
///
/// Returns (TempDir, context) - keep the TempDir alive to prevent cleanup.
pub fn init_repo() -> (TempDir, ReviewContext) {
    let temp_dir = tempfile::tempdir().unwrap();
    let ctx = ops::init(temp_dir.path(), "Platform ecosystems review").unwrap();
    (temp_dir, ctx)
}

/// API source identified by DOI, feed under `data/search/`
pub fn api_source(endpoint: &str, feed: &str) -> SearchSource {
    SearchSource {
        endpoint: endpoint.to_string(),
        filename: format!("data/search/{feed}").into(),
        search_type: SearchType::Api,
        source_identifier: "doi".to_string(),
        origin_prefix: None,
        search_parameters: BTreeMap::new(),
    }
}

/// Source reading a BibTeX export stored in the repository
pub fn bibtex_source(feed: &str, export: &str) -> SearchSource {
    let mut search_parameters = BTreeMap::new();
    search_parameters.insert("file".to_string(), toml::Value::String(export.to_string()));
    SearchSource {
        endpoint: "bibtex".to_string(),
        filename: format!("data/search/{feed}").into(),
        search_type: SearchType::Db,
        source_identifier: "doi".to_string(),
        origin_prefix: None,
        search_parameters,
    }
}

/// Register sources in the settings and persist them
pub fn add_sources(ctx: &mut ReviewContext, sources: Vec<SearchSource>) {
    ctx.settings.sources.extend(sources);
    ctx.settings.persistence.retry_attempts = 1;
    ctx.save_settings().unwrap();
    ctx.commit("Add search sources").unwrap();
}

/// A freshly retrieved journal article
pub fn article(doi: &str, title: &str, author: &str, year: &str, journal: &str) -> Record {
    Record::new("retrieved", "article")
        .with_field("doi", doi)
        .with_field("title", title)
        .with_field("author", author)
        .with_field("year", year)
        .with_field("journal", journal)
}

/// A main record waiting for deduplication, attributed to one origin
pub fn prepared(id: &str, prefix: &str, doi: &str, title: &str) -> Record {
    with_status(id, prefix, doi, title, RecordStatus::Prepared)
}

/// A main record in the given status, attributed to one origin
pub fn with_status(id: &str, prefix: &str, doi: &str, title: &str, status: RecordStatus) -> Record {
    let mut record = Record::new(id, "article")
        .with_field("doi", doi)
        .with_field("title", title)
        .with_field("author", "Smith, John and Lee, Ann")
        .with_field("year", "2020")
        .with_field("journal", "MIS Quarterly");
    let origin = Origin::new(prefix, id);
    record.add_provenance_all(&origin.to_string());
    record.add_origin(origin);
    record.status = status;
    record
}

/// Store records as the main record set and commit them
pub fn seed(ctx: &mut ReviewContext, records: Vec<Record>) {
    let mut set: RecordSet = records.into_iter().map(|r| (r.id.clone(), r)).collect();
    ctx.save_records(&mut set).unwrap();
    ctx.commit("Seed records").unwrap();
}

/// Main record linked to the given DOI
pub fn by_doi<'a>(records: &'a RecordSet, doi: &str) -> &'a Record {
    records
        .values()
        .find(|r| r.get("doi").is_some_and(|d| d.eq_ignore_ascii_case(doi)))
        .unwrap_or_else(|| panic!("no record with doi {doi}"))
}

/// Write a file below the repository root
pub fn write_file(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

/// Message of the latest change-log entry
pub fn last_message(ctx: &ReviewContext) -> String {
    ctx.dataset
        .changelog()
        .history()
        .unwrap()
        .last()
        .map(|c| c.message.clone())
        .unwrap_or_default()
}

/// Number of change-log entries
pub fn history_len(ctx: &ReviewContext) -> usize {
    ctx.dataset.changelog().history().unwrap().len()
}

/// Endpoint returning one canned batch per search, in order
pub struct CannedEndpoint {
    key: &'static str,
    batches: Mutex<Vec<Vec<Record>>>,
}

impl CannedEndpoint {
    pub fn new(key: &'static str, batches: Vec<Vec<Record>>) -> Self {
        Self {
            key,
            batches: Mutex::new(batches),
        }
    }
}

impl SearchEndpoint for CannedEndpoint {
    fn key(&self) -> &str {
        self.key
    }

    fn api_search_supported(&self) -> bool {
        true
    }

    fn validate_source(&self, _source: &SearchSource) -> litrev::Result<()> {
        Ok(())
    }

    fn run_search(&self, _source: &SearchSource, _root: &Path, _rerun: bool) -> litrev::Result<Vec<Record>> {
        let mut batches = self.batches.lock().unwrap();
        if batches.is_empty() {
            return Ok(Vec::new());
        }
        Ok(batches.remove(0))
    }
}

/// Registry holding one canned endpoint
pub fn canned_registry(key: &'static str, batches: Vec<Vec<Record>>) -> EndpointRegistry {
    let mut registry = EndpointRegistry::new();
    registry.register(Box::new(CannedEndpoint::new(key, batches)));
    registry
}
