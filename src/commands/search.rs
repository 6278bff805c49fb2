// src/commands/search.rs

//! Search and load commands

use anyhow::Result;
use litrev::ops::{self, SearchReport};
use litrev::settings::{SearchSource, SearchType};
use litrev::sources::EndpointRegistry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

fn print_report(report: &SearchReport) {
    for outcome in &report.outcomes {
        println!(
            "{}: {} retrieved, {} added, {} changed",
            outcome.source.display(),
            outcome.retrieved,
            outcome.added,
            outcome.changed
        );
        if outcome.skipped > 0 {
            println!("  {} record(s) without identifier skipped", outcome.skipped);
        }
        for id in &outcome.needs_review {
            println!("  Review changes of {}", id);
        }
    }
    for failure in &report.failures {
        println!("{}: FAILED ({})", failure.source.display(), failure.error);
    }
}

/// Turn the search report into the command result
///
/// Source failures fail the command unless `force` is set.
fn finish(report: &SearchReport, force: bool) -> Result<()> {
    print_report(report);
    println!("\nSearch finished: {} added, {} changed", report.added(), report.changed());

    if report.failures.is_empty() {
        return Ok(());
    }
    if force {
        warn!(failed = report.failures.len(), "sources failed, continuing (force)");
        return Ok(());
    }
    Err(anyhow::anyhow!(
        "{} source(s) failed. Use --force to continue anyway.",
        report.failures.len()
    ))
}

/// Search the selected sources
pub fn cmd_search(path: &Path, select: Option<&str>, rerun: bool, force: bool) -> Result<()> {
    let mut ctx = super::open(path, force)?;
    let registry = EndpointRegistry::with_builtins();
    let report = ops::search(&mut ctx, &registry, select, rerun)?;
    finish(&report, force)
}

/// Parse `key=value`; integers are stored as integers
fn parse_param(param: &str) -> Result<(String, toml::Value)> {
    let (key, value) = param
        .split_once('=')
        .filter(|(k, _)| !k.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("invalid search parameter '{}' (expected KEY=VALUE)", param))?;
    let value = match value.trim().parse::<i64>() {
        Ok(n) => toml::Value::Integer(n),
        Err(_) => toml::Value::String(value.trim().to_string()),
    };
    Ok((key.trim().to_string(), value))
}

/// Register a new search source and run its first search
pub fn cmd_add_source(
    path: &Path,
    endpoint: &str,
    filename: Option<PathBuf>,
    identifier: Option<&str>,
    params: &[String],
    force: bool,
) -> Result<()> {
    let registry = EndpointRegistry::with_builtins();
    let search_type = if registry.get(endpoint)?.api_search_supported() {
        SearchType::Api
    } else {
        SearchType::Db
    };
    let search_parameters = params
        .iter()
        .map(|p| parse_param(p))
        .collect::<Result<BTreeMap<_, _>>>()?;

    let source = SearchSource {
        endpoint: endpoint.to_string(),
        filename: filename.unwrap_or_default(),
        search_type,
        source_identifier: identifier.unwrap_or("doi").to_string(),
        origin_prefix: None,
        search_parameters,
    };

    let mut ctx = super::open(path, force)?;
    let report = ops::add_source(&mut ctx, &registry, source)?;
    if let Some(added) = ctx.settings.sources.last() {
        println!("Added search source {} ({})", added.filename.display(), added.endpoint);
    }
    finish(&report, force)
}

/// Load new feed records into the main record set
pub fn cmd_load(path: &Path, select: Option<&str>) -> Result<()> {
    let mut ctx = super::open(path, false)?;
    let report = ops::load(&mut ctx, select)?;

    for (source, count) in report.per_source.iter().filter(|(_, c)| **c > 0) {
        println!("{}: {} record(s) loaded", source.display(), count);
    }
    println!("Loaded {} record(s)", report.loaded.len());
    Ok(())
}
