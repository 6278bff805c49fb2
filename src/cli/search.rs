// src/cli/search.rs
//! Options for registering a new search source with `search --add`

use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug, Clone, Default)]
pub struct AddSourceArgs {
    /// Register a new source with this endpoint (bibtex, crossref) and search it
    #[arg(long, value_name = "ENDPOINT")]
    pub add: Option<String>,

    /// Feed filename of the new source (allocated if omitted)
    #[arg(long, requires = "add")]
    pub filename: Option<PathBuf>,

    /// Field identifying records within the new source [default: doi]
    #[arg(long, requires = "add")]
    pub identifier: Option<String>,

    /// Search parameter of the new source (repeatable)
    #[arg(long = "param", value_name = "KEY=VALUE", requires = "add")]
    pub params: Vec<String>,
}
