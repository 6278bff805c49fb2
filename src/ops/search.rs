// src/ops/search.rs

//! Search: retrieve every selected source and merge it into its feed
//!
//! Sources run one after another in priority order (highest first). Each
//! source's feed and the main record set are flushed and committed before
//! the next source starts, so an interrupted run keeps finished sources.
//! A failing source is recorded and skipped; whether that fails the run is
//! the caller's decision (`force`).

use super::ReviewContext;
use crate::feed::{MergeContext, OriginFeed};
use crate::settings::SearchSource;
use crate::sources::{EndpointRegistry, drop_forthcoming, unique_filename};
use crate::{Error, Result};
use std::path::PathBuf;
use tracing::{info, warn};

/// Result of one source
#[derive(Debug, Clone, Default)]
pub struct SourceOutcome {
    pub source: PathBuf,
    pub retrieved: usize,
    pub added: usize,
    pub changed: usize,
    /// Records without a usable source identifier
    pub skipped: usize,
    /// Main records with substantial unexpected changes
    pub needs_review: Vec<String>,
}

/// A source that could not be searched
#[derive(Debug)]
pub struct SourceFailure {
    pub source: PathBuf,
    pub error: Error,
}

#[derive(Debug, Default)]
pub struct SearchReport {
    pub outcomes: Vec<SourceOutcome>,
    pub failures: Vec<SourceFailure>,
}

impl SearchReport {
    pub fn added(&self) -> usize {
        self.outcomes.iter().map(|o| o.added).sum()
    }

    pub fn changed(&self) -> usize {
        self.outcomes.iter().map(|o| o.changed).sum()
    }
}

/// Run the search for the selected sources
///
/// `rerun` retrieves everything again and also reconciles time-variant
/// fields; otherwise stored time-variant values are kept.
pub fn search(
    ctx: &mut ReviewContext,
    registry: &EndpointRegistry,
    selection: Option<&str>,
    rerun: bool,
) -> Result<SearchReport> {
    let priority = ctx.settings.source_priority();
    let mut sources: Vec<SearchSource> = ctx
        .settings
        .select_sources(selection)?
        .into_iter()
        .cloned()
        .collect();
    sources.sort_by(|a, b| priority.compare(&a.origin_prefix(), &b.origin_prefix()));

    let mut records = ctx.load_records()?;
    let mut report = SearchReport::default();
    let retry = ctx.settings.persistence.retry_policy();

    for source in &sources {
        // An unreadable feed fails its source like an unreachable endpoint
        let fetched = OriginFeed::load(&ctx.dataset, source, !rerun).and_then(|feed| {
            let endpoint = registry.get(&source.endpoint)?;
            endpoint.validate_source(source)?;
            let batch = retry.run(&format!("search {}", source.filename.display()), || {
                endpoint.run_search(source, ctx.root(), rerun)
            })?;
            Ok((feed, batch))
        });
        let (mut feed, mut batch) = match fetched {
            Ok(fetched) => fetched,
            Err(error) => {
                if ctx.force {
                    warn!(source = %source.filename.display(), %error, "source failed, continuing (force)");
                } else {
                    warn!(source = %source.filename.display(), %error, "source failed");
                }
                report.failures.push(SourceFailure {
                    source: source.filename.clone(),
                    error,
                });
                continue;
            }
        };
        if !ctx.settings.search.retrieve_forthcoming {
            batch = drop_forthcoming(batch);
        }
        let retrieved = batch.len();

        let mut merge_ctx = MergeContext {
            tracker: &ctx.tracker,
            machine: &mut ctx.machine,
            update_time_variant_fields: rerun,
        };
        let merged = feed.merge(batch, &mut records, &mut merge_ctx);

        let flushed = feed
            .save(&mut ctx.dataset)
            .and_then(|_| ctx.save_records(&mut records))
            .and_then(|_| ctx.commit(&format!("Search {}", source.filename.display())));
        if let Err(e) = flushed {
            ctx.abort()?;
            return Err(e);
        }

        let outcome = SourceOutcome {
            source: source.filename.clone(),
            retrieved,
            added: merged.added.len(),
            changed: merged.nr_changed(),
            skipped: merged.skipped.len(),
            needs_review: merged
                .updates
                .iter()
                .filter(|u| u.needs_review())
                .map(|u| u.record_id.clone())
                .collect(),
        };
        info!(
            source = %outcome.source.display(),
            retrieved,
            added = outcome.added,
            changed = outcome.changed,
            "source searched"
        );
        report.outcomes.push(outcome);
    }

    Ok(report)
}

/// Register a new source and run its first search
///
/// An empty filename gets a unique one derived from the endpoint key.
pub fn add_source(
    ctx: &mut ReviewContext,
    registry: &EndpointRegistry,
    mut source: SearchSource,
) -> Result<SearchReport> {
    registry.get(&source.endpoint)?.validate_source(&source)?;
    if source.filename.as_os_str().is_empty() {
        source.filename = unique_filename(&source.endpoint, &ctx.settings.sources);
    }
    if ctx.settings.sources.iter().any(|s| s.filename == source.filename) {
        return Err(Error::Settings(format!(
            "source {} already exists",
            source.filename.display()
        )));
    }

    info!(source = %source.filename.display(), endpoint = %source.endpoint, "adding search source");
    let selection = source.filename.to_string_lossy().into_owned();
    ctx.settings.sources.push(source);
    ctx.save_settings()?;
    ctx.commit(&format!("Add search source {selection}"))?;

    search(ctx, registry, Some(&selection), false)
}
