// src/sources/bibtex.rs

//! Records from a local BibTeX export
//!
//! ```toml
//! [[sources]]
//! endpoint = "bibtex"
//! filename = "data/search/wos.bib"
//! source_identifier = "doi"
//! [sources.search_parameters]
//! file = "exports/wos-2024-05.bib"
//! ```

use super::SearchEndpoint;
use crate::bib::{RESERVED_KEYS, parse_entries};
use crate::record::Record;
use crate::settings::SearchSource;
use crate::{Error, Result};
use std::path::Path;
use tracing::{debug, warn};

/// Search parameter naming the export file (relative to the repository root)
const FILE_PARAMETER: &str = "file";

#[derive(Debug, Clone, Copy, Default)]
pub struct BibtexEndpoint;

impl SearchEndpoint for BibtexEndpoint {
    fn key(&self) -> &str {
        "bibtex"
    }

    fn api_search_supported(&self) -> bool {
        false
    }

    fn validate_source(&self, source: &SearchSource) -> Result<()> {
        if source.parameter(FILE_PARAMETER).is_none_or(|f| f.trim().is_empty()) {
            return Err(Error::Settings(format!(
                "source {}: bibtex endpoint needs search_parameters.{FILE_PARAMETER}",
                source.filename.display()
            )));
        }
        Ok(())
    }

    fn run_search(&self, source: &SearchSource, root: &Path, _rerun: bool) -> Result<Vec<Record>> {
        self.validate_source(source)?;
        let relative = source.parameter(FILE_PARAMETER).unwrap_or_default();
        let path = root.join(relative);
        let text = std::fs::read_to_string(&path)?;

        let mut records = Vec::new();
        for entry in parse_entries(&text, relative)? {
            let mut record = Record::new(entry.id, entry.entry_type);
            for (key, value) in &entry.fields {
                if RESERVED_KEYS.contains(&key.as_str()) {
                    warn!(file = relative, record = %record.id, key = %key, "pipeline key in export ignored");
                    continue;
                }
                record.insert_field(key, value.trim());
            }
            records.push(record);
        }
        debug!(file = relative, records = records.len(), "export read");
        Ok(records)
    }
}
