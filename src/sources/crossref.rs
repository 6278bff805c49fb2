// src/sources/crossref.rs

//! Crossref works API
//!
//! ```toml
//! [[sources]]
//! endpoint = "crossref"
//! filename = "data/search/crossref.bib"
//! search_type = "api"
//! source_identifier = "doi"
//! [sources.search_parameters]
//! query = "digital platform ecosystems"
//! rows = 200
//! ```
//!
//! Connection failures and 5xx responses are reported as
//! [`Error::ServiceNotAvailable`] so the caller can retry or skip the source.

use super::SearchEndpoint;
use crate::record::{FORTHCOMING, Record};
use crate::settings::SearchSource;
use crate::{Error, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_API_URL: &str = "https://api.crossref.org";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_ROWS: u64 = 200;

/// Crossref caps `rows` per request
const MAX_ROWS: u64 = 1000;

const SERVICE: &str = "crossref";

#[derive(Debug, Deserialize)]
struct WorksResponse {
    message: WorksMessage,
}

#[derive(Debug, Deserialize)]
struct WorksMessage {
    #[serde(default)]
    items: Vec<Work>,
}

#[derive(Debug, Deserialize)]
struct Work {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(rename = "type", default)]
    work_type: String,
    #[serde(default)]
    title: Vec<String>,
    #[serde(rename = "container-title", default)]
    container_title: Vec<String>,
    #[serde(default)]
    author: Vec<Author>,
    volume: Option<String>,
    issue: Option<String>,
    page: Option<String>,
    publisher: Option<String>,
    #[serde(rename = "URL")]
    url: Option<String>,
    #[serde(rename = "is-referenced-by-count")]
    cited_by: Option<u64>,
    #[serde(rename = "published-print")]
    published_print: Option<DateParts>,
    #[serde(rename = "published-online")]
    published_online: Option<DateParts>,
    issued: Option<DateParts>,
}

#[derive(Debug, Deserialize)]
struct Author {
    given: Option<String>,
    family: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DateParts {
    #[serde(rename = "date-parts", default)]
    date_parts: Vec<Vec<Option<i64>>>,
}

impl DateParts {
    fn year(&self) -> Option<i64> {
        self.date_parts.first().and_then(|p| p.first().copied().flatten())
    }
}

fn entry_type(work_type: &str) -> &'static str {
    match work_type {
        "journal-article" => "article",
        "proceedings-article" => "inproceedings",
        "book-chapter" | "book-section" | "book-part" => "incollection",
        "book" | "monograph" | "edited-book" => "book",
        "dissertation" => "phdthesis",
        "report" => "techreport",
        _ => "misc",
    }
}

fn author_field(authors: &[Author]) -> Option<String> {
    let names: Vec<String> = authors
        .iter()
        .filter_map(|a| match (&a.family, &a.given, &a.name) {
            (Some(family), Some(given), _) => Some(format!("{family}, {given}")),
            (Some(family), None, _) => Some(family.clone()),
            (None, _, Some(name)) => Some(name.clone()),
            _ => None,
        })
        .collect();
    (!names.is_empty()).then(|| names.join(" and "))
}

fn work_to_record(work: Work) -> Record {
    let entry_type = entry_type(&work.work_type);
    let mut record = Record::new(work.doi.clone().unwrap_or_default(), entry_type);

    let mut set = |field: &str, value: Option<String>| {
        if let Some(value) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
            record.insert_field(field, &value);
        }
    };

    set("doi", work.doi.map(|d| d.to_uppercase()));
    set("title", work.title.into_iter().next());
    let container = work.container_title.into_iter().next();
    match entry_type {
        "article" => set("journal", container),
        "inproceedings" | "incollection" => set("booktitle", container),
        _ => {}
    }
    set("author", author_field(&work.author));
    set("volume", work.volume);
    set("number", work.issue);
    set("pages", work.page.map(|p| p.replace('-', "--")));
    set("publisher", work.publisher);
    set("url", work.url);
    set("cited_by", work.cited_by.map(|c| c.to_string()));

    // Online-first articles without a print date are still forthcoming
    let print_year = work.published_print.as_ref().and_then(DateParts::year);
    let online_only = print_year.is_none() && work.published_online.is_some();
    if entry_type == "article" && online_only {
        set("year", Some(FORTHCOMING.to_string()));
    } else {
        let year = print_year.or_else(|| work.issued.as_ref().and_then(DateParts::year));
        set("year", year.map(|y| y.to_string()));
    }

    record
}

/// Records from a works API response body
pub fn parse_works(body: &str) -> Result<Vec<Record>> {
    let response: WorksResponse = serde_json::from_str(body)?;
    Ok(response
        .message
        .items
        .into_iter()
        .filter(|w| w.doi.is_some())
        .map(work_to_record)
        .collect())
}

/// Crossref endpoint over the public works API
#[derive(Debug, Clone)]
pub struct CrossrefEndpoint {
    api_url: String,
}

impl Default for CrossrefEndpoint {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

impl CrossrefEndpoint {
    pub fn new(api_url: &str) -> Self {
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    fn unavailable(reason: impl Into<String>) -> Error {
        Error::ServiceNotAvailable {
            service: SERVICE.to_string(),
            reason: reason.into(),
        }
    }

    fn fetch(&self, query: &str, rows: u64) -> Result<String> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Self::unavailable(format!("failed to create HTTP client: {e}")))?;

        let url = format!("{}/works", self.api_url);
        debug!(%url, query, rows, "querying crossref");
        let rows = rows.to_string();
        let response = client
            .get(&url)
            .query(&[("query", query), ("rows", rows.as_str())])
            .send()
            .map_err(|e| Self::unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(Self::unavailable(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(Error::Settings(format!("crossref rejected the query: HTTP {status}")));
        }
        response.text().map_err(|e| Self::unavailable(e.to_string()))
    }
}

impl SearchEndpoint for CrossrefEndpoint {
    fn key(&self) -> &str {
        SERVICE
    }

    fn api_search_supported(&self) -> bool {
        true
    }

    fn validate_source(&self, source: &SearchSource) -> Result<()> {
        if source.parameter("query").is_none_or(|q| q.trim().is_empty()) {
            return Err(Error::Settings(format!(
                "source {}: crossref endpoint needs search_parameters.query",
                source.filename.display()
            )));
        }
        if source.source_identifier != "doi" {
            return Err(Error::Settings(format!(
                "source {}: crossref records are identified by doi, not {}",
                source.filename.display(),
                source.source_identifier
            )));
        }
        Ok(())
    }

    fn run_search(&self, source: &SearchSource, _root: &Path, rerun: bool) -> Result<Vec<Record>> {
        self.validate_source(source)?;
        let query = source.parameter("query").unwrap_or_default();
        let rows = source.parameter_u64("rows").unwrap_or(DEFAULT_ROWS).min(MAX_ROWS);

        let body = self.fetch(query, rows)?;
        let records = parse_works(&body)?;
        info!(source = %source.filename.display(), records = records.len(), rerun, "crossref search finished");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
      "status": "ok",
      "message": {
        "items": [
          {
            "DOI": "10.1/x",
            "type": "journal-article",
            "title": ["Digital platform ecosystems"],
            "container-title": ["MIS Quarterly"],
            "author": [
              {"given": "John", "family": "Smith"},
              {"given": "Ann", "family": "Lee"}
            ],
            "volume": "44",
            "issue": "2",
            "page": "1-20",
            "is-referenced-by-count": 12,
            "published-print": {"date-parts": [[2020, 6]]}
          },
          {
            "DOI": "10.1/y",
            "type": "journal-article",
            "title": ["Accepted paper"],
            "container-title": ["MIS Quarterly"],
            "published-online": {"date-parts": [[2024, 1, 5]]},
            "issued": {"date-parts": [[2024, 1, 5]]}
          },
          {
            "type": "journal-article",
            "title": ["No DOI"]
          },
          {
            "DOI": "10.1/z",
            "type": "proceedings-article",
            "title": ["Conference paper"],
            "container-title": ["ICIS"],
            "author": [{"name": "The Consortium"}],
            "issued": {"date-parts": [[2019]]}
          }
        ]
      }
    }"#;

    #[test]
    fn test_parse_works() {
        let records = parse_works(BODY).unwrap();
        assert_eq!(records.len(), 3);

        let article = &records[0];
        assert_eq!(article.entry_type, "article");
        assert_eq!(article.get("doi"), Some("10.1/X"));
        assert_eq!(article.get("author"), Some("Smith, John and Lee, Ann"));
        assert_eq!(article.get("journal"), Some("MIS Quarterly"));
        assert_eq!(article.get("number"), Some("2"));
        assert_eq!(article.get("pages"), Some("1--20"));
        assert_eq!(article.get("year"), Some("2020"));
        assert_eq!(article.get("cited_by"), Some("12"));

        assert_eq!(records[1].get("year"), Some(FORTHCOMING));

        let paper = &records[2];
        assert_eq!(paper.entry_type, "inproceedings");
        assert_eq!(paper.get("booktitle"), Some("ICIS"));
        assert_eq!(paper.get("author"), Some("The Consortium"));
        assert_eq!(paper.get("year"), Some("2019"));
    }

    #[test]
    fn test_malformed_body() {
        assert!(matches!(parse_works("{\"message\": 3}"), Err(Error::Json(_))));
    }

    #[test]
    fn test_unreachable_service() {
        // Nothing listens on the discard port
        let endpoint = CrossrefEndpoint::new("http://127.0.0.1:9");
        let err = endpoint.fetch("platforms", 1).unwrap_err();
        assert!(err.is_transient());
    }
}
