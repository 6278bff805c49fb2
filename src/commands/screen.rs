// src/commands/screen.rs

//! Screening commands: prescreen, pdfs, screen, data

use crate::cli::ScreenArgs;
use anyhow::Result;
use litrev::ops::{self, ScreenDecision, ScreenReport};
use std::path::Path;

fn decision(args: &ScreenArgs) -> Result<ScreenDecision> {
    if args.include_all {
        return Ok(ScreenDecision::IncludeAll);
    }
    let include = ops::parse_selection(args.include.as_deref()).unwrap_or_default();
    let exclude = ops::parse_selection(args.exclude.as_deref()).unwrap_or_default();
    if include.is_empty() && exclude.is_empty() {
        return Err(anyhow::anyhow!(
            "nothing to decide: use --include-all, --include or --exclude"
        ));
    }
    Ok(ScreenDecision::Decide {
        include,
        exclude,
        reason: args.reason.clone().unwrap_or_default(),
    })
}

fn print_report(step: &str, report: &ScreenReport) {
    println!(
        "{}: {} included, {} excluded",
        step,
        report.included.len(),
        report.excluded.len()
    );
}

pub fn cmd_prescreen(path: &Path, args: &ScreenArgs) -> Result<()> {
    let decision = decision(args)?;
    let mut ctx = super::open(path, false)?;
    let report = ops::prescreen(&mut ctx, &decision)?;
    print_report("Prescreen", &report);
    Ok(())
}

pub fn cmd_screen(path: &Path, args: &ScreenArgs) -> Result<()> {
    let decision = decision(args)?;
    let mut ctx = super::open(path, false)?;
    let report = ops::screen(&mut ctx, &decision)?;
    print_report("Screen", &report);
    Ok(())
}

pub fn cmd_pdfs(path: &Path, not_available: Option<&str>) -> Result<()> {
    let mut ctx = super::open(path, false)?;
    let report = ops::pdfs(&mut ctx, not_available)?;

    println!("PDFs prepared: {}", report.prepared.len());
    println!("Marked not available: {}", report.not_available.len());
    if !report.needs_manual_retrieval.is_empty() {
        println!("\nNeed manual retrieval ({}):", report.needs_manual_retrieval.len());
        for id in &report.needs_manual_retrieval {
            println!("  {}", id);
        }
        println!("\nSet the 'file' field of these records, then run 'litrev pdfs' again.");
    }
    Ok(())
}

pub fn cmd_data(path: &Path, select: Option<&str>) -> Result<()> {
    let mut ctx = super::open(path, false)?;
    let synthesized = ops::data(&mut ctx, select)?;
    println!("Synthesized {} record(s)", synthesized.len());
    Ok(())
}
