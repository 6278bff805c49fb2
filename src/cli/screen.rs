// src/cli/screen.rs
//! Arguments shared by `prescreen` and `screen`

use clap::Args;

#[derive(Args, Debug, Clone)]
pub struct ScreenArgs {
    /// Include every eligible record
    #[arg(long, conflicts_with_all = ["include", "exclude"])]
    pub include_all: bool,

    /// Comma-separated ids to include
    #[arg(long)]
    pub include: Option<String>,

    /// Comma-separated ids to exclude
    #[arg(long, requires = "reason")]
    pub exclude: Option<String>,

    /// Exclusion reason or criteria
    #[arg(long)]
    pub reason: Option<String>,
}
