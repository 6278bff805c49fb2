// src/settings/mod.rs

//! Project settings (`settings.toml`)
//!
//! ```toml
//! [project]
//! title = "Digital platform review"
//!
//! [search]
//! retrieve_forthcoming = true
//!
//! [[sources]]
//! endpoint = "crossref"
//! filename = "data/search/crossref.bib"
//! search_type = "api"
//! source_identifier = "doi"
//! [sources.search_parameters]
//! query = "digital platforms"
//!
//! [dedupe]
//! merge_threshold = 0.9
//! review_threshold = 0.7
//! ```
//!
//! Sources are listed in priority order: when two ordinary sources disagree
//! on a field, the one listed first wins.

use crate::provenance::SourcePriority;
use crate::retry::RetryPolicy;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use strum_macros::{AsRefStr, Display, EnumString};

/// Settings file name at the repository root
pub const SETTINGS_FILE: &str = "settings.toml";

/// Root settings document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub project: ProjectSettings,

    #[serde(default)]
    pub search: SearchSettings,

    #[serde(default)]
    pub sources: Vec<SearchSource>,

    #[serde(default)]
    pub dedupe: DedupeSettings,

    #[serde(default)]
    pub persistence: PersistenceSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSettings {
    pub title: String,

    /// Additional curated source prefixes (besides `md_curated.bib`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub curated_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Keep forthcoming (accepted, unpublished) records in search results
    #[serde(default = "default_true")]
    pub retrieve_forthcoming: bool,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            retrieve_forthcoming: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// How a source's records are obtained
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SearchType {
    /// Exported from a database search
    #[default]
    Db,
    /// Retrieved through an API
    Api,
    /// Curated metadata repository
    Md,
    Other,
}

/// One search source and its feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSource {
    /// Endpoint registry key (`bibtex`, `crossref`, ...)
    pub endpoint: String,

    /// Feed snapshot path relative to the repository root
    pub filename: PathBuf,

    #[serde(default)]
    pub search_type: SearchType,

    /// Field that uniquely identifies a record within this source
    pub source_identifier: String,

    /// Explicit origin prefix (defaults to the feed file name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_prefix: Option<String>,

    /// Endpoint-specific parameters
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub search_parameters: BTreeMap<String, toml::Value>,
}

impl SearchSource {
    /// Prefix used in origins of records from this source
    pub fn origin_prefix(&self) -> String {
        if let Some(prefix) = &self.origin_prefix {
            return prefix.clone();
        }
        self.filename
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.filename.to_string_lossy().into_owned())
    }

    /// String-valued search parameter
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.search_parameters.get(key).and_then(toml::Value::as_str)
    }

    /// Integer-valued search parameter
    pub fn parameter_u64(&self, key: &str) -> Option<u64> {
        self.search_parameters
            .get(key)
            .and_then(toml::Value::as_integer)
            .and_then(|v| u64::try_from(v).ok())
    }

    /// Whether a selection token names this source
    pub fn matches(&self, token: &str) -> bool {
        self.filename.to_string_lossy() == token
            || self.origin_prefix() == token
            || self.filename.file_stem().is_some_and(|s| s.to_string_lossy() == token)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupeSettings {
    /// Confidence at or above which pairs merge automatically
    #[serde(default = "default_merge_threshold")]
    pub merge_threshold: f64,

    /// Confidence at or above which pairs need manual review
    #[serde(default = "default_review_threshold")]
    pub review_threshold: f64,

    /// Nearest neighbours requested per candidate
    #[serde(default = "default_neighbours")]
    pub neighbours: usize,
}

fn default_merge_threshold() -> f64 {
    0.9
}

fn default_review_threshold() -> f64 {
    0.7
}

fn default_neighbours() -> usize {
    10
}

impl Default for DedupeSettings {
    fn default() -> Self {
        Self {
            merge_threshold: default_merge_threshold(),
            review_threshold: default_review_threshold(),
            neighbours: default_neighbours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceSettings {
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
}

fn default_retry_attempts() -> u32 {
    5
}

fn default_retry_base_ms() -> u64 {
    100
}

fn default_retry_max_ms() -> u64 {
    2000
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_base_ms: default_retry_base_ms(),
            retry_max_ms: default_retry_max_ms(),
        }
    }
}

impl PersistenceSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            base_delay: Duration::from_millis(self.retry_base_ms),
            max_delay: Duration::from_millis(self.retry_max_ms),
            ..RetryPolicy::default()
        }
    }
}

impl Settings {
    /// Default settings for a new repository
    pub fn new(title: &str) -> Self {
        Self {
            project: ProjectSettings {
                title: title.to_string(),
                curated_prefixes: Vec::new(),
            },
            search: SearchSettings::default(),
            sources: Vec::new(),
            dedupe: DedupeSettings::default(),
            persistence: PersistenceSettings::default(),
        }
    }

    /// Load `settings.toml` from a repository root
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(SETTINGS_FILE);
        if !path.exists() {
            return Err(Error::NotInitialized(root.to_path_buf()));
        }
        let content = std::fs::read_to_string(&path)?;
        Self::parse(&content).map_err(|e| match e {
            Error::Settings(msg) => Error::Settings(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn parse(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content).map_err(|e| Error::Settings(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Settings(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        let d = &self.dedupe;
        if !(0.0..=1.0).contains(&d.merge_threshold) || !(0.0..=1.0).contains(&d.review_threshold) {
            return Err(Error::Settings("dedupe thresholds must be within [0, 1]".to_string()));
        }
        if d.review_threshold > d.merge_threshold {
            return Err(Error::Settings(
                "dedupe.review_threshold must not exceed dedupe.merge_threshold".to_string(),
            ));
        }

        let mut filenames = HashSet::new();
        let mut prefixes = HashSet::new();
        for source in &self.sources {
            if source.source_identifier.trim().is_empty() {
                return Err(Error::Settings(format!(
                    "source {} has an empty source_identifier",
                    source.filename.display()
                )));
            }
            if !filenames.insert(source.filename.clone()) {
                return Err(Error::Settings(format!(
                    "duplicate source filename {}",
                    source.filename.display()
                )));
            }
            let prefix = source.origin_prefix();
            if prefix.contains(';') || prefix.chars().any(char::is_whitespace) {
                return Err(Error::Settings(format!("invalid origin prefix '{prefix}'")));
            }
            if !prefixes.insert(prefix.clone()) {
                return Err(Error::Settings(format!("duplicate origin prefix '{prefix}'")));
            }
        }
        Ok(())
    }

    /// Source priority derived from the source list order
    pub fn source_priority(&self) -> SourcePriority {
        let mut priority = SourcePriority::new(self.sources.iter().map(SearchSource::origin_prefix));
        for prefix in &self.project.curated_prefixes {
            priority = priority.with_curated(prefix.clone());
        }
        priority
    }

    /// Sources named by a comma-separated selection (`None` or `all` selects every source)
    pub fn select_sources(&self, selection: Option<&str>) -> Result<Vec<&SearchSource>> {
        let Some(selection) = selection.filter(|s| *s != "all") else {
            return Ok(self.sources.iter().collect());
        };
        let tokens: Vec<&str> = selection.split(',').map(str::trim).filter(|t| !t.is_empty()).collect();
        let selected: Vec<&SearchSource> = self
            .sources
            .iter()
            .filter(|s| tokens.iter().any(|t| s.matches(t)))
            .collect();
        if selected.is_empty() {
            return Err(Error::Selection {
                value: selection.to_string(),
                options: self
                    .sources
                    .iter()
                    .map(|s| s.filename.to_string_lossy().into_owned())
                    .collect(),
            });
        }
        Ok(selected)
    }

    /// Source owning an origin prefix
    pub fn source_by_prefix(&self, prefix: &str) -> Option<&SearchSource> {
        self.sources.iter().find(|s| s.origin_prefix() == prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTINGS: &str = r#"
[project]
title = "Platform review"

[search]
retrieve_forthcoming = false

[[sources]]
endpoint = "crossref"
filename = "data/search/crossref.bib"
search_type = "api"
source_identifier = "doi"

[sources.search_parameters]
query = "digital platforms"
rows = 50

[[sources]]
endpoint = "bibtex"
filename = "data/search/pubmed.bib"
source_identifier = "pmid"
origin_prefix = "pubmed"
"#;

    #[test]
    fn test_parse_settings() {
        let settings = Settings::parse(SETTINGS).unwrap();
        assert!(!settings.search.retrieve_forthcoming);
        assert_eq!(settings.sources.len(), 2);
        let crossref = &settings.sources[0];
        assert_eq!(crossref.search_type, SearchType::Api);
        assert_eq!(crossref.origin_prefix(), "crossref.bib");
        assert_eq!(crossref.parameter("query"), Some("digital platforms"));
        assert_eq!(crossref.parameter_u64("rows"), Some(50));
        assert_eq!(settings.sources[1].origin_prefix(), "pubmed");
        assert_eq!(settings.sources[1].search_type, SearchType::Db);
        assert_eq!(settings.dedupe.merge_threshold, 0.9);
    }

    #[test]
    fn test_priority_follows_list_order() {
        let settings = Settings::parse(SETTINGS).unwrap();
        let priority = settings.source_priority();
        assert!(priority.rank("crossref.bib") < priority.rank("pubmed"));
    }

    #[test]
    fn test_select_sources() {
        let settings = Settings::parse(SETTINGS).unwrap();
        assert_eq!(settings.select_sources(None).unwrap().len(), 2);
        assert_eq!(settings.select_sources(Some("all")).unwrap().len(), 2);
        let selected = settings.select_sources(Some("pubmed")).unwrap();
        assert_eq!(selected[0].source_identifier, "pmid");
        let selected = settings.select_sources(Some("data/search/crossref.bib")).unwrap();
        assert_eq!(selected[0].endpoint, "crossref");

        let err = settings.select_sources(Some("scopus.bib")).unwrap_err();
        assert!(matches!(err, Error::Selection { .. }));
    }

    #[test]
    fn test_invalid_thresholds() {
        let content = "[project]\ntitle = \"x\"\n[dedupe]\nmerge_threshold = 0.5\nreview_threshold = 0.8\n";
        assert!(matches!(Settings::parse(content), Err(Error::Settings(_))));
    }

    #[test]
    fn test_duplicate_prefix_rejected() {
        let content = r#"
[project]
title = "x"
[[sources]]
endpoint = "bibtex"
filename = "a/x.bib"
source_identifier = "id"
[[sources]]
endpoint = "bibtex"
filename = "b/x.bib"
source_identifier = "id"
"#;
        assert!(Settings::parse(content).is_err());
    }

    #[test]
    fn test_roundtrip_toml() {
        let settings = Settings::parse(SETTINGS).unwrap();
        let rendered = settings.to_toml().unwrap();
        let reparsed = Settings::parse(&rendered).unwrap();
        assert_eq!(reparsed.sources, settings.sources);
    }

    #[test]
    fn test_missing_file_not_initialized() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(Settings::load(dir.path()), Err(Error::NotInitialized(_))));
    }
}
