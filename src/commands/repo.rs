// src/commands/repo.rs

//! Repository management commands: init, status, validate, reset

use anyhow::{Context, Result};
use litrev::ops::{self, StatusStats};
use litrev::record::RecordStatus;
use std::path::Path;
use tracing::info;

/// Initialize a review repository
pub fn cmd_init(path: &Path, title: &str) -> Result<()> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    ops::init(path, title)?;
    println!("Initialized review '{}' at {}", title, path.display());
    println!("\nUse 'litrev search --add <endpoint> --param query=...' to add a search source.");
    Ok(())
}

fn print_stats(stats: &StatusStats) {
    println!("Records: {}", stats.total());
    for (status, count) in stats.per_state.iter().filter(|(_, c)| **c > 0) {
        println!("  {:<32} {}", status, count);
    }

    let flow = &stats.flow;
    println!("\nFlow:");
    println!("  Retrieved:          {}", flow.retrieved);
    println!("  Duplicates removed: {}", stats.duplicates_removed);
    println!("  Deduplicated:       {}", flow.deduplicated);
    println!("  Prescreened:        {}", flow.prescreened);
    println!("  Prescreen included: {}", flow.prescreen_included);
    println!("  Screened:           {}", flow.screened);
    println!("  Included:           {}", flow.included);

    if !stats.exclusion_reasons.is_empty() {
        println!("\nExclusion reasons:");
        for (reason, count) in &stats.exclusion_reasons {
            println!("  {:<32} {}", reason, count);
        }
    }

    if stats.needs_manual > 0 {
        println!("\n{} record(s) need manual work", stats.needs_manual);
    }
    if stats.completed {
        println!("\nReview completed.");
    }
}

/// Show status counts
pub fn cmd_status(path: &Path, json: bool) -> Result<()> {
    let ctx = super::open(path, false)?;
    let stats = ops::stats(&ctx)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("Review: {}", ctx.settings.project.title);
        print_stats(&stats);
    }
    Ok(())
}

/// Report consistency violations; fails if there are any
pub fn cmd_validate(path: &Path) -> Result<()> {
    let ctx = super::open(path, false)?;
    let violations = ops::validate(&ctx)?;
    if violations.is_empty() {
        println!("No violations found.");
        return Ok(());
    }

    println!("Violations ({}):", violations.len());
    for violation in &violations {
        println!("  {}", violation);
    }
    Err(anyhow::anyhow!("{} violation(s) found", violations.len()))
}

/// Reset records to an earlier status
pub fn cmd_reset(path: &Path, ids: &str, to: &str, reason: &str) -> Result<()> {
    let to = RecordStatus::parse(to)?;
    let ids = ops::parse_selection(Some(ids))
        .filter(|ids| !ids.is_empty())
        .ok_or_else(|| anyhow::anyhow!("no record ids given"))?;

    let mut ctx = super::open(path, false)?;
    let reset = ops::reset(&mut ctx, &ids, to, reason)?;
    info!(records = reset.len(), "reset finished");
    for id in &reset {
        println!("Reset {} to {}", id, to);
    }
    Ok(())
}
