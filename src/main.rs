// src/main.rs

use anyhow::Result;
use clap::{CommandFactory, Parser};
use litrev::ops::ManualDecision;

mod cli;
mod commands;

use cli::{Cli, Commands};

/// Pair of ids from a two-valued option
fn pair(values: Vec<String>) -> Result<(String, String)> {
    match <[String; 2]>::try_from(values) {
        Ok([a, b]) => Ok((a, b)),
        Err(_) => Err(anyhow::anyhow!("expected exactly two record ids")),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing subscriber for logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let path = cli.path.as_path();
    let force = cli.force;

    match cli.command {
        Some(Commands::Init { title }) => commands::cmd_init(path, &title),
        Some(Commands::Search { select, rerun, add }) => match add.add {
            Some(endpoint) => commands::cmd_add_source(
                path,
                &endpoint,
                add.filename,
                add.identifier.as_deref(),
                &add.params,
                force,
            ),
            None => commands::cmd_search(path, select.as_deref(), rerun, force),
        },
        Some(Commands::Load { select }) => commands::cmd_load(path, select.as_deref()),
        Some(Commands::Prep { select }) => commands::cmd_prep(path, select.as_deref()),
        Some(Commands::Dedupe {
            distinct,
            merge,
            pending,
        }) => {
            if pending {
                return commands::cmd_dedupe_pending(path);
            }
            if let Some(ids) = distinct {
                let (a, b) = pair(ids)?;
                return commands::cmd_dedupe_decision(path, ManualDecision::Distinct(a, b));
            }
            if let Some(ids) = merge {
                let (a, b) = pair(ids)?;
                return commands::cmd_dedupe_decision(path, ManualDecision::Merge(a, b));
            }
            commands::cmd_dedupe(path)
        }
        Some(Commands::Prescreen(args)) => commands::cmd_prescreen(path, &args),
        Some(Commands::Pdfs { not_available }) => commands::cmd_pdfs(path, not_available.as_deref()),
        Some(Commands::Screen(args)) => commands::cmd_screen(path, &args),
        Some(Commands::Data { select }) => commands::cmd_data(path, select.as_deref()),
        Some(Commands::Status { json }) => commands::cmd_status(path, json),
        Some(Commands::Validate) => commands::cmd_validate(path),
        Some(Commands::Reset { ids, to, reason }) => commands::cmd_reset(path, &ids, &to, &reason),
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(shell, &mut Cli::command(), "litrev", &mut std::io::stdout());
            Ok(())
        }
        None => {
            // No command provided, show help
            println!("litrev v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'litrev --help' for usage information");
            Ok(())
        }
    }
}
