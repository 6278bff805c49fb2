// src/lib.rs

//! litrev: literature review pipeline
//!
//! Bibliographic records flow from search sources into per-source feeds,
//! are linked into one main record set, prepared, deduplicated and
//! screened. Every field value carries provenance and every status change
//! goes through one state machine.
//!
//! # Architecture
//!
//! - Snapshots: feeds and the main record set are BibTeX files, written
//!   atomically and committed to a checksummed change log
//! - Provenance: field updates go through [`provenance::ProvenanceTracker`],
//!   which protects curated values and hand edits
//! - Lifecycle: [`lifecycle::StatusMachine`] only moves records forward;
//!   backward moves are audited resets
//! - Feeds: [`feed::OriginFeed`] keeps stable feed-local ids and
//!   reconciles fresh source data into linked main records
//! - Dedupe: [`dedupe::DedupeGuard`] restricts merges to the dedupe
//!   boundary and refuses same-source and known-distinct pairs

pub mod bib;
pub mod dataset;
pub mod dedupe;
mod error;
pub mod feed;
pub mod lifecycle;
pub mod ops;
pub mod provenance;
pub mod quality;
pub mod record;
pub mod retry;
pub mod settings;
pub mod similarity;
pub mod sources;

pub use error::{Error, Result};
pub use lifecycle::{AuditEntry, ChangeKind, StatusMachine};
pub use ops::ReviewContext;
pub use provenance::{ProvenanceEntry, ProvenanceTracker, SourcePriority};
pub use record::{Origin, Record, RecordSet, RecordStatus};
pub use settings::{SearchSource, Settings};
