// src/feed/reconcile.rs

//! Reconciling a main record with a fresh version of one of its source records
//!
//! Order of checks for a linked main record:
//! 1. retraction signals exclude the record and stop here
//! 2. `forthcoming` year replaced by the published year
//! 3. curated main records are only touched by curated sources
//! 4. field-by-field reconciliation
//! 5. change classification against the previously synced version
//!
//! A set field is only replaced when the main record still holds exactly what
//! this source delivered last time. Anything else means a human or another
//! source changed it since, and the merger leaves it alone.

use super::MergeContext;
use crate::provenance::{FieldUpdate, UpdateOptions};
use crate::record::{
    FORTHCOMING, IDENTIFIER_KEYS, Origin, Record, UNKNOWN, is_concrete_year, is_time_variant_field,
};
use crate::similarity::{self, FieldChange, ROUTINE_CHANGE_THRESHOLD};
use tracing::{debug, info, warn};

/// Domains of aggregators whose links are never overwritten once set
pub const AGGREGATOR_DOMAINS: &[&str] = &["dblp.org"];

/// How a change to a linked main record was classified
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeClass {
    /// Nothing changed
    Unchanged,
    /// The source record was retracted
    Retracted,
    /// A forthcoming paper was published
    ForthcomingPublished,
    /// Small update (similarity above the routine threshold)
    Routine { similarity: f64 },
    /// Large unexpected delta; needs human review
    Substantial { similarity: f64, diff: Vec<FieldChange> },
}

/// Result of reconciling one main record
#[derive(Debug, Clone)]
pub struct FeedUpdate {
    pub record_id: String,
    pub origin: Origin,
    pub changed: bool,
    pub class: ChangeClass,
}

impl FeedUpdate {
    pub fn needs_review(&self) -> bool {
        matches!(self.class, ChangeClass::Substantial { .. })
    }
}

fn is_aggregator_url(value: &str) -> bool {
    let Some(host) = url::Url::parse(value.trim())
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
    else {
        return AGGREGATOR_DOMAINS.iter().any(|d| value.contains(d));
    };
    AGGREGATOR_DOMAINS
        .iter()
        .any(|d| host == *d || host.ends_with(&format!(".{d}")))
}

/// Reconcile `main` with the fresh feed record `record`
///
/// `previous` is the version of the same source record stored in the feed
/// before this run (None on first sync).
pub fn update_existing_record(
    main: &mut Record,
    record: &Record,
    previous: Option<&Record>,
    origin: &Origin,
    ctx: &mut MergeContext<'_>,
) -> FeedUpdate {
    let source = origin.to_string();
    let mut update = FeedUpdate {
        record_id: main.id.clone(),
        origin: origin.clone(),
        changed: false,
        class: ChangeClass::Unchanged,
    };

    if record.is_retracted() {
        match ctx.machine.exclude_retracted(main) {
            Ok(changed) => {
                if changed {
                    info!(record = %main.id, %origin, "found paper retract");
                }
                update.changed = changed;
                update.class = if changed { ChangeClass::Retracted } else { ChangeClass::Unchanged };
            }
            Err(e) => warn!(record = %main.id, error = %e, "could not exclude retracted record"),
        }
        return update;
    }

    if main.year() == Some(FORTHCOMING)
        && let Some(year) = record.year().filter(|y| is_concrete_year(y))
    {
        let result = ctx
            .tracker
            .update_field(main, "year", year, &source, UpdateOptions::default());
        if result.changed() {
            info!(record = %main.id, year, "update published forthcoming paper");
            update.changed = true;
        }
    }

    let priority = ctx.tracker.priority();
    let source_curated = priority.is_curated(&origin.prefix);
    if !source_curated && main.origins.iter().any(|o| priority.is_curated(&o.prefix)) {
        debug!(record = %main.id, %origin, "curated record, non-curated source skipped");
        update.class = classify(&update, record, previous);
        return update;
    }

    for (key, value) in &record.fields {
        if IDENTIFIER_KEYS.contains(&key.as_str()) {
            continue;
        }
        if !ctx.update_time_variant_fields && is_time_variant_field(key) {
            continue;
        }

        let current = main.get(key).map(str::to_string);
        match current.as_deref() {
            None | Some(UNKNOWN) => {
                // Curated not-missing exceptions are rejected by the tracker
                let result =
                    ctx.tracker
                        .update_field(main, key, value, &source, UpdateOptions::default());
                if result.changed() {
                    update.changed = true;
                }
            }
            Some(current) => {
                if !source_curated {
                    // Hand-edited or owned by another source since the last sync
                    if previous.and_then(|p| p.get(key)) != Some(current) {
                        continue;
                    }
                    if let Some(current_source) = main.provenance(key).and_then(|p| p.source())
                        && !ctx.tracker.outranks(&source, current_source)
                    {
                        continue;
                    }
                }
                if crate::provenance::equivalent(value, current) {
                    continue;
                }
                if key == "url" && (is_aggregator_url(value) || is_aggregator_url(current)) {
                    continue;
                }

                let result =
                    ctx.tracker
                        .update_field(main, key, value, &source, UpdateOptions::default());
                match result {
                    FieldUpdate::Rejected(reason) => {
                        debug!(record = %main.id, field = %key, ?reason, "update rejected");
                    }
                    other if other.changed() => update.changed = true,
                    _ => {}
                }
            }
        }
    }

    update.class = classify(&update, record, previous);
    match &update.class {
        ChangeClass::ForthcomingPublished => {
            info!(record = %main.id, "forthcoming paper published");
        }
        ChangeClass::Routine { similarity } => {
            info!(record = %main.id, %origin, similarity, "check/update");
        }
        ChangeClass::Substantial { similarity, diff } => {
            let lines: Vec<String> = diff.iter().map(|c| format!("  {c}")).collect();
            warn!(
                record = %main.id,
                %origin,
                similarity,
                "check/update leads to substantial changes:\n{}",
                lines.join("\n")
            );
        }
        _ => {}
    }
    update
}

fn classify(update: &FeedUpdate, record: &Record, previous: Option<&Record>) -> ChangeClass {
    if !update.changed {
        return ChangeClass::Unchanged;
    }
    let Some(previous) = previous else {
        return ChangeClass::Routine { similarity: 1.0 };
    };
    if similarity::is_forthcoming_published(previous, record) {
        return ChangeClass::ForthcomingPublished;
    }
    let score = similarity::change_similarity(previous, record);
    if score > ROUTINE_CHANGE_THRESHOLD {
        ChangeClass::Routine { similarity: score }
    } else {
        ChangeClass::Substantial {
            similarity: score,
            diff: similarity::diff(previous, record),
        }
    }
}
