// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: comma-separated selection
fn select_arg(help: &'static str) -> Arg {
    Arg::new("select")
        .short('s')
        .long("select")
        .value_name("LIST")
        .help(help)
}

/// Arguments shared by prescreen and screen
fn screen_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("include_all")
            .long("include-all")
            .action(ArgAction::SetTrue)
            .help("Include every eligible record"),
    )
    .arg(Arg::new("include").long("include").help("Comma-separated ids to include"))
    .arg(Arg::new("exclude").long("exclude").help("Comma-separated ids to exclude"))
    .arg(Arg::new("reason").long("reason").help("Exclusion reason or criteria"))
}

fn build_cli() -> Command {
    Command::new("litrev")
        .version(env!("CARGO_PKG_VERSION"))
        .author("litrev contributors")
        .about("Literature review pipeline with provenance tracking")
        .subcommand_required(false)
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .global(true)
                .default_value(".")
                .help("Review repository root"),
        )
        .arg(
            Arg::new("force")
                .short('f')
                .long("force")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Continue past failing sources with a warning"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Debug logging (RUST_LOG overrides)"),
        )
        .subcommand(
            Command::new("init")
                .about("Initialize a review repository")
                .arg(Arg::new("title").short('t').long("title").help("Review title")),
        )
        .subcommand(
            Command::new("search")
                .about("Retrieve search sources and merge them into their feeds")
                .arg(select_arg("Comma-separated sources"))
                .arg(
                    Arg::new("rerun")
                        .long("rerun")
                        .action(ArgAction::SetTrue)
                        .help("Retrieve everything again and reconcile time-variant fields"),
                )
                .arg(Arg::new("add").long("add").value_name("ENDPOINT").help("Register and search a new source"))
                .arg(Arg::new("filename").long("filename").help("Feed filename of the new source"))
                .arg(Arg::new("identifier").long("identifier").help("Field identifying records within the new source"))
                .arg(
                    Arg::new("param")
                        .long("param")
                        .value_name("KEY=VALUE")
                        .action(ArgAction::Append)
                        .help("Search parameter of the new source"),
                ),
        )
        .subcommand(
            Command::new("load")
                .about("Create main records from new feed records")
                .arg(select_arg("Comma-separated sources")),
        )
        .subcommand(
            Command::new("prep")
                .about("Run the quality model over imported records")
                .arg(select_arg("Comma-separated record ids")),
        )
        .subcommand(
            Command::new("dedupe")
                .about("Merge duplicates of prepared records")
                .arg(Arg::new("distinct").long("distinct").num_args(2).help("Record two ids as distinct works"))
                .arg(Arg::new("merge").long("merge").num_args(2).help("Merge two records (still guarded)"))
                .arg(
                    Arg::new("pending")
                        .long("pending")
                        .action(ArgAction::SetTrue)
                        .help("List pairs waiting for manual validation"),
                ),
        )
        .subcommand(screen_args(Command::new("prescreen").about("Prescreen deduplicated records")))
        .subcommand(
            Command::new("pdfs")
                .about("Link PDFs of prescreen-included records")
                .arg(
                    Arg::new("not_available")
                        .long("not-available")
                        .help("Comma-separated ids whose PDF cannot be obtained"),
                ),
        )
        .subcommand(screen_args(Command::new("screen").about("Screen records with prepared PDFs")))
        .subcommand(
            Command::new("data")
                .about("Mark included records as synthesized")
                .arg(select_arg("Comma-separated record ids")),
        )
        .subcommand(
            Command::new("status")
                .about("Show status counts")
                .arg(Arg::new("json").long("json").action(ArgAction::SetTrue).help("Print as JSON")),
        )
        .subcommand(Command::new("validate").about("Check records for consistency violations"))
        .subcommand(
            Command::new("reset")
                .about("Move records back to an earlier status (audited)")
                .arg(Arg::new("ids").required(true).help("Comma-separated record ids"))
                .arg(Arg::new("to").long("to").required(true).help("Target status"))
                .arg(Arg::new("reason").long("reason").required(true).help("Reason recorded in the change log")),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completions")
                .arg(Arg::new("shell").required(true).help("Shell to generate completions for")),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory - use CARGO_MANIFEST_DIR which is always set by cargo
    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("litrev.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
