// src/commands/mod.rs
//! Command handlers for the litrev CLI

mod dedupe;
mod repo;
mod screen;
mod search;

// Re-export all command handlers
pub use dedupe::{cmd_dedupe, cmd_dedupe_decision, cmd_dedupe_pending, cmd_prep};
pub use repo::{cmd_init, cmd_reset, cmd_status, cmd_validate};
pub use screen::{cmd_data, cmd_pdfs, cmd_prescreen, cmd_screen};
pub use search::{cmd_add_source, cmd_load, cmd_search};

use litrev::ops::ReviewContext;
use std::path::Path;

/// Open the review repository at `path`
pub(crate) fn open(path: &Path, force: bool) -> anyhow::Result<ReviewContext> {
    Ok(ReviewContext::open(path, force)?)
}
