// src/feed/mod.rs

//! Origin feeds
//!
//! A feed is one source's own persisted record snapshot, keyed by a
//! feed-local incremental id (`000001`, `000002`, ...). The source identifier
//! value (a DOI, an accession number, ...) maps to exactly one feed id and
//! that mapping never changes across runs, so re-importing the same source
//! record always lands on the same origin `<prefix>/<feed-id>`.
//!
//! Merging a batch:
//! 1. identify each record (reuse or assign its feed id)
//! 2. store it in the feed without pipeline state
//! 3. if a main record is linked to its origin, reconcile it (see
//!    [`reconcile`])
//!
//! Creating main records for new feed records is the load step, not part of
//! the merge.

pub mod reconcile;

pub use reconcile::{ChangeClass, FeedUpdate};

use crate::dataset::Dataset;
use crate::lifecycle::StatusMachine;
use crate::provenance::ProvenanceTracker;
use crate::record::{Origin, Record, RecordSet, UNKNOWN, find_by_origin, is_time_variant_field};
use crate::settings::SearchSource;
use crate::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Width of feed-local ids
const FEED_ID_WIDTH: usize = 6;

/// Collaborators used while reconciling main records
pub struct MergeContext<'a> {
    pub tracker: &'a ProvenanceTracker,
    pub machine: &'a mut StatusMachine,
    /// Reconcile time-variant fields too (rerun mode)
    pub update_time_variant_fields: bool,
}

/// Outcome of merging one batch
#[derive(Debug, Default)]
pub struct MergeReport {
    /// Feed ids added to the feed (awaiting load)
    pub added: Vec<String>,
    /// Per linked main record: what changed
    pub updates: Vec<FeedUpdate>,
    /// Records skipped with the reason (not feed-identifiable)
    pub skipped: Vec<Error>,
}

impl MergeReport {
    pub fn nr_changed(&self) -> usize {
        self.updates.iter().filter(|u| u.changed).count()
    }
}

/// A source's feed snapshot plus its identifier index
#[derive(Debug)]
pub struct OriginFeed {
    origin_prefix: String,
    source_identifier: String,
    path: PathBuf,
    update_only: bool,
    records: RecordSet,
    available_ids: HashMap<String, String>,
    next_id: u64,
    nr_added: usize,
    nr_changed: usize,
}

/// Identifier fields whose values compare case-insensitively
const CASE_INSENSITIVE_IDENTIFIERS: &[&str] = &["doi"];

/// Lookup key of an identifier value
///
/// Values match exactly, except for identifier kinds that are
/// case-insensitive by definition (DOIs).
fn identifier_key(identifier: &str, value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value == UNKNOWN {
        return None;
    }
    if CASE_INSENSITIVE_IDENTIFIERS.contains(&identifier) {
        Some(value.to_lowercase())
    } else {
        Some(value.to_string())
    }
}

impl OriginFeed {
    /// Build a feed over already loaded feed records
    pub fn new(source: &SearchSource, records: RecordSet, update_only: bool) -> Self {
        let mut available_ids = HashMap::new();
        for record in records.values() {
            let key = record
                .get(&source.source_identifier)
                .and_then(|v| identifier_key(&source.source_identifier, v));
            let Some(key) = key else {
                warn!(feed = %source.filename.display(), id = %record.id, "feed record without source identifier");
                continue;
            };
            if let Some(existing) = available_ids.get(&key) {
                warn!(
                    feed = %source.filename.display(),
                    identifier = %key,
                    kept = %existing,
                    duplicate = %record.id,
                    "identifier maps to more than one feed record"
                );
                continue;
            }
            available_ids.insert(key, record.id.clone());
        }

        let max_id = records
            .keys()
            .filter_map(|id| id.parse::<u64>().ok())
            .max()
            .unwrap_or(0);

        Self {
            origin_prefix: source.origin_prefix(),
            source_identifier: source.source_identifier.clone(),
            path: source.filename.clone(),
            update_only,
            records,
            available_ids,
            next_id: max_id + 1,
            nr_added: 0,
            nr_changed: 0,
        }
    }

    /// Load the feed snapshot of a source
    pub fn load(dataset: &Dataset, source: &SearchSource, update_only: bool) -> Result<Self> {
        let records = dataset.load_feed(&source.filename)?;
        debug!(feed = %source.filename.display(), records = records.len(), "feed loaded");
        Ok(Self::new(source, records, update_only))
    }

    pub fn origin_prefix(&self) -> &str {
        &self.origin_prefix
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &RecordSet {
        &self.records
    }

    pub fn nr_added(&self) -> usize {
        self.nr_added
    }

    pub fn nr_changed(&self) -> usize {
        self.nr_changed
    }

    /// Origin of a feed record
    pub fn origin(&self, feed_id: &str) -> Origin {
        Origin::new(self.origin_prefix.clone(), feed_id)
    }

    /// Feed id already assigned to an identifier value
    pub fn lookup(&self, identifier_value: &str) -> Option<&str> {
        identifier_key(&self.source_identifier, identifier_value)
            .and_then(|key| self.available_ids.get(&key))
            .map(String::as_str)
    }

    /// Assign the record its feed id; returns true if the id is new
    pub fn set_id(&mut self, record: &mut Record) -> Result<bool> {
        let key = record
            .get(&self.source_identifier)
            .and_then(|v| identifier_key(&self.source_identifier, v))
            .ok_or_else(|| Error::NotFeedIdentifiable {
                identifier: self.source_identifier.clone(),
            })?;

        if let Some(id) = self.available_ids.get(&key) {
            record.id = id.clone();
            return Ok(false);
        }

        let id = format!("{:0width$}", self.next_id, width = FEED_ID_WIDTH);
        self.next_id += 1;
        self.available_ids.insert(key, id.clone());
        record.id = id;
        Ok(true)
    }

    /// Store an identified record; returns the previously stored version
    pub fn add_record(&mut self, record: &Record) -> Option<Record> {
        let mut feed_record = record.to_feed_record();
        let previous = self.records.get(&feed_record.id).cloned();

        if self.update_only
            && let Some(prev) = &previous
        {
            // Keep stored time-variant values so fresh noise does not churn
            let time_variant: Vec<String> = feed_record
                .field_names()
                .chain(prev.field_names())
                .filter(|f| is_time_variant_field(f))
                .map(str::to_string)
                .collect();
            for field in time_variant {
                match prev.get(&field) {
                    Some(value) => feed_record.insert_field(&field, value),
                    None => {
                        feed_record.remove_field(&field);
                    }
                }
            }
        }

        if previous.is_none() {
            self.nr_added += 1;
        }
        feed_record.mark_clean();
        self.records.insert(feed_record.id.clone(), feed_record);
        previous
    }

    /// Merge a batch of freshly retrieved records
    ///
    /// Records without a usable identifier are skipped and reported; the
    /// rest of the batch continues.
    pub fn merge(&mut self, batch: Vec<Record>, main: &mut RecordSet, ctx: &mut MergeContext<'_>) -> MergeReport {
        let mut report = MergeReport::default();

        for mut record in batch {
            let is_new = match self.set_id(&mut record) {
                Ok(is_new) => is_new,
                Err(e) => {
                    warn!(feed = %self.path.display(), error = %e, "record skipped");
                    report.skipped.push(e);
                    continue;
                }
            };

            let previous = self.add_record(&record);
            if is_new {
                report.added.push(record.id.clone());
            }

            let origin = self.origin(&record.id);
            let Some(main_id) = find_by_origin(main, &origin).map(|r| r.id.clone()) else {
                continue;
            };
            let Some(main_record) = main.get_mut(&main_id) else {
                continue;
            };

            let update = reconcile::update_existing_record(
                main_record,
                &record,
                previous.as_ref(),
                &origin,
                ctx,
            );
            if update.changed {
                self.nr_changed += 1;
            }
            report.updates.push(update);
        }

        info!(
            feed = %self.path.display(),
            added = report.added.len(),
            changed = report.nr_changed(),
            skipped = report.skipped.len(),
            "feed merged"
        );
        report
    }

    /// Persist the feed snapshot (retried on contention by the dataset)
    pub fn save(&self, dataset: &mut Dataset) -> Result<()> {
        if self.records.is_empty() {
            return Ok(());
        }
        dataset.save_feed(&self.path, &self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SearchType;
    use std::collections::BTreeMap;

    fn source() -> SearchSource {
        SearchSource {
            endpoint: "crossref".into(),
            filename: "data/search/crossref.bib".into(),
            search_type: SearchType::Api,
            source_identifier: "doi".into(),
            origin_prefix: None,
            search_parameters: BTreeMap::new(),
        }
    }

    fn fresh(doi: &str, title: &str) -> Record {
        Record::new("tmp", "article").with_field("doi", doi).with_field("title", title)
    }

    #[test]
    fn test_ids_are_incremental_and_padded() {
        let mut feed = OriginFeed::new(&source(), RecordSet::new(), true);
        let mut a = fresh("10.1/a", "A");
        let mut b = fresh("10.1/b", "B");
        assert!(feed.set_id(&mut a).unwrap());
        assert!(feed.set_id(&mut b).unwrap());
        assert_eq!(a.id, "000001");
        assert_eq!(b.id, "000002");
    }

    #[test]
    fn test_identifier_reuses_id() {
        let mut feed = OriginFeed::new(&source(), RecordSet::new(), true);
        let mut a = fresh("10.1/A", "A");
        feed.set_id(&mut a).unwrap();
        feed.add_record(&a);

        let mut again = fresh("10.1/a", "A revised");
        assert!(!feed.set_id(&mut again).unwrap());
        assert_eq!(again.id, a.id);
        assert_eq!(feed.nr_added(), 1);
    }

    #[test]
    fn test_case_sensitive_identifiers_stay_distinct() {
        let mut by_url = source();
        by_url.source_identifier = "url".into();
        let mut feed = OriginFeed::new(&by_url, RecordSet::new(), true);

        let mut first = Record::new("tmp", "misc")
            .with_field("url", "https://ex.org/Paper/AbC")
            .with_field("title", "First");
        let mut second = Record::new("tmp", "misc")
            .with_field("url", "https://ex.org/Paper/abc")
            .with_field("title", "Second");
        assert!(feed.set_id(&mut first).unwrap());
        feed.add_record(&first);
        assert!(feed.set_id(&mut second).unwrap());
        feed.add_record(&second);

        assert_eq!(first.id, "000001");
        assert_eq!(second.id, "000002");
        assert_eq!(feed.records().len(), 2);
        assert_eq!(feed.records()["000001"].get("title"), Some("First"));
        assert_eq!(feed.lookup("https://ex.org/Paper/abc"), Some("000002"));
        assert_eq!(feed.lookup("https://ex.org/paper/abc"), None);
    }

    #[test]
    fn test_next_id_after_loaded_records() {
        let mut records = RecordSet::new();
        for id in ["000001", "000007"] {
            let record = Record::new(id, "article").with_field("doi", &format!("10.1/{id}"));
            records.insert(id.to_string(), record);
        }
        let mut feed = OriginFeed::new(&source(), records, true);
        let mut r = fresh("10.1/new", "New");
        feed.set_id(&mut r).unwrap();
        assert_eq!(r.id, "000008");
        assert_eq!(feed.lookup("10.1/000007"), Some("000007"));
    }

    #[test]
    fn test_missing_identifier() {
        let mut feed = OriginFeed::new(&source(), RecordSet::new(), true);
        let mut r = Record::new("tmp", "article").with_field("title", "No DOI");
        let err = feed.set_id(&mut r).unwrap_err();
        assert_eq!(err.to_string(), "not feed-identifiable (doi not in record)");

        let mut r = Record::new("tmp", "article").with_field("doi", UNKNOWN);
        assert!(feed.set_id(&mut r).is_err());
    }

    #[test]
    fn test_time_variant_preserved_in_update_only() {
        let mut feed = OriginFeed::new(&source(), RecordSet::new(), true);
        let mut first = fresh("10.1/a", "A").with_field("cited_by", "3");
        feed.set_id(&mut first).unwrap();
        feed.add_record(&first);

        let mut second = fresh("10.1/a", "A").with_field("cited_by", "9");
        feed.set_id(&mut second).unwrap();
        let previous = feed.add_record(&second).unwrap();
        assert_eq!(previous.get("cited_by"), Some("3"));
        assert_eq!(feed.records()["000001"].get("cited_by"), Some("3"));
    }

    #[test]
    fn test_time_variant_refreshed_on_rerun() {
        let mut feed = OriginFeed::new(&source(), RecordSet::new(), false);
        let mut first = fresh("10.1/a", "A").with_field("cited_by", "3");
        feed.set_id(&mut first).unwrap();
        feed.add_record(&first);

        let mut second = fresh("10.1/a", "A").with_field("cited_by", "9");
        feed.set_id(&mut second).unwrap();
        feed.add_record(&second);
        assert_eq!(feed.records()["000001"].get("cited_by"), Some("9"));
    }

    #[test]
    fn test_feed_strips_pipeline_state() {
        let mut feed = OriginFeed::new(&source(), RecordSet::new(), true);
        let mut r = fresh("10.1/a", "A");
        r.status = crate::record::RecordStatus::Processed;
        r.add_provenance_all("crossref.bib/000001");
        feed.set_id(&mut r).unwrap();
        feed.add_record(&r);

        let stored = &feed.records()["000001"];
        assert_eq!(stored.status, crate::record::RecordStatus::Retrieved);
        assert!(stored.masterdata_provenance.is_empty());
        assert!(stored.data_provenance.is_empty());
    }
}
