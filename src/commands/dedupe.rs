// src/commands/dedupe.rs

//! Prep and dedupe commands

use anyhow::Result;
use litrev::dedupe::{DecisionStore, MergeOutcome};
use litrev::ops::{self, ManualDecision};
use std::path::Path;

/// Run the quality model
pub fn cmd_prep(path: &Path, select: Option<&str>) -> Result<()> {
    let mut ctx = super::open(path, false)?;
    let report = ops::prep(&mut ctx, select)?;

    println!("Prepared {} record(s)", report.prepared.len());
    if !report.needs_manual.is_empty() {
        println!("\nNeed manual preparation ({}):", report.needs_manual.len());
        for (id, defects) in &report.needs_manual {
            let defects: Vec<String> = defects.iter().map(|(f, n)| format!("{f}: {n}")).collect();
            println!("  {} ({})", id, defects.join(", "));
        }
    }
    Ok(())
}

/// Automatic deduplication
pub fn cmd_dedupe(path: &Path) -> Result<()> {
    let mut ctx = super::open(path, false)?;
    let report = ops::run_dedupe(&mut ctx)?;

    for (survivor, retired) in &report.merged {
        println!("Merged {} into {}", retired, survivor);
    }
    for (proposal, refusal) in &report.refused {
        println!("Refused {} / {} ({:.2}): {}", proposal.a, proposal.b, proposal.score, refusal);
    }
    println!(
        "\n{} merged, {} need manual merge, {} processed",
        report.merged.len(),
        report.needs_manual_merge.len(),
        report.processed.len()
    );
    if !report.held.is_empty() {
        println!(
            "{} record(s) wait for manual validation (see 'litrev dedupe --pending')",
            report.held.len()
        );
    }
    Ok(())
}

/// List pairs on the manual validation list
pub fn cmd_dedupe_pending(path: &Path) -> Result<()> {
    let ctx = super::open(path, false)?;
    let store = DecisionStore::load(&ctx.dataset)?;
    let pending = store.manual_validation();
    if pending.is_empty() {
        println!("No pairs waiting for validation.");
        return Ok(());
    }

    println!("Pairs waiting for validation ({}):", pending.len());
    for item in pending {
        println!("  {} / {} ({:.2}): {}", item.a, item.b, item.score, item.reason);
    }
    println!("\nUse 'litrev dedupe --distinct A B' or 'litrev dedupe --merge A B'.");
    Ok(())
}

/// Apply a curator decision
pub fn cmd_dedupe_decision(path: &Path, decision: ManualDecision) -> Result<()> {
    let mut ctx = super::open(path, false)?;
    let outcome = ops::run_manual_decision(&mut ctx, decision.clone())?;

    match (&decision, outcome) {
        (ManualDecision::Distinct(a, b), _) => {
            println!("Recorded {} and {} as distinct", a, b);
            Ok(())
        }
        (ManualDecision::Merge(..), MergeOutcome::Merged { survivor, retired }) => {
            println!("Merged {} into {}", retired, survivor);
            Ok(())
        }
        (ManualDecision::Merge(a, b), MergeOutcome::Refused { refusal, .. }) => {
            Err(anyhow::anyhow!("merge of {} and {} refused: {}", a, b, refusal))
        }
    }
}
