// src/cli/mod.rs
//! CLI definitions for litrev
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.
//!
//! Pipeline commands, in order:
//! - `search` - Retrieve search sources into their feeds
//! - `load` - Create main records from new feed records
//! - `prep` - Run the quality model
//! - `dedupe` - Merge duplicates through the boundary guard
//! - `prescreen`, `pdfs`, `screen`, `data` - Screening and synthesis
//!
//! Repository management: `init`, `status`, `validate`, `reset`.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

mod screen;
mod search;

pub use screen::ScreenArgs;
pub use search::AddSourceArgs;

#[derive(Parser)]
#[command(name = "litrev")]
#[command(author = "litrev contributors")]
#[command(version)]
#[command(about = "Literature review pipeline with provenance tracking", long_about = None)]
pub struct Cli {
    /// Review repository root
    #[arg(short, long, global = true, default_value = ".")]
    pub path: PathBuf,

    /// Continue past failing sources with a warning
    #[arg(short, long, global = true)]
    pub force: bool,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a review repository
    Init {
        /// Review title
        #[arg(short, long, default_value = "Literature review")]
        title: String,
    },

    /// Retrieve search sources and merge them into their feeds
    Search {
        /// Comma-separated sources (filename, stem or origin prefix)
        #[arg(short, long)]
        select: Option<String>,

        /// Retrieve everything again and reconcile time-variant fields
        #[arg(long)]
        rerun: bool,

        #[command(flatten)]
        add: AddSourceArgs,
    },

    /// Create main records from new feed records
    Load {
        /// Comma-separated sources
        #[arg(short, long)]
        select: Option<String>,
    },

    /// Run the quality model over imported records
    Prep {
        /// Comma-separated record ids
        #[arg(short, long)]
        select: Option<String>,
    },

    /// Merge duplicates of prepared records
    Dedupe {
        /// Record two ids as distinct works
        #[arg(long, num_args = 2, value_names = ["A", "B"], conflicts_with = "merge")]
        distinct: Option<Vec<String>>,

        /// Merge two records (still subject to the guard)
        #[arg(long, num_args = 2, value_names = ["A", "B"])]
        merge: Option<Vec<String>>,

        /// List pairs waiting for manual validation
        #[arg(long, conflicts_with_all = ["distinct", "merge"])]
        pending: bool,
    },

    /// Prescreen deduplicated records
    Prescreen(ScreenArgs),

    /// Link PDFs of prescreen-included records
    Pdfs {
        /// Comma-separated ids whose PDF cannot be obtained
        #[arg(long)]
        not_available: Option<String>,
    },

    /// Screen records with prepared PDFs
    Screen(ScreenArgs),

    /// Mark included records as synthesized
    Data {
        /// Comma-separated record ids
        #[arg(short, long)]
        select: Option<String>,
    },

    /// Show status counts
    Status {
        /// Print the statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check records for consistency violations
    Validate,

    /// Move records back to an earlier status (audited)
    Reset {
        /// Comma-separated record ids
        ids: String,

        /// Target status (e.g. md_prepared)
        #[arg(long)]
        to: String,

        /// Reason recorded in the change log
        #[arg(long)]
        reason: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
