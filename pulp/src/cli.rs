//! CLI command definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::debug;

/// Pulp - document intelligence from the terminal
#[derive(Parser)]
#[command(
    name = "pulp",
    about = "Extract, aggregate and rewrite long documents with an LLM",
    version = env!("CARGO_PKG_VERSION")
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, help = "Log level (trace, debug, info, warn, error)")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Process a document once and print the result
    Run {
        /// Document to process (.md, .txt, or anything docling can convert)
        file: PathBuf,

        /// What to do with it, e.g. "summarize for my boss"
        instruction: String,
    },

    /// Interactive session; without a file, chat with skills
    Chat {
        /// Document to open
        file: Option<PathBuf>,
    },

    /// List the skill catalog
    Skills,

    /// Check that the configured provider is reachable
    Ping,
}

/// Path of the log file
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pulp")
        .join("logs")
        .join("pulp.log");
    debug!(?path, "get_log_path: returning path");
    path
}

/// Text shown under `--help`
pub fn generate_after_help() -> String {
    let user_config = dirs::config_dir()
        .map(|dir| dir.join("pulp").join("pulp.yml").display().to_string())
        .unwrap_or_else(|| "~/.config/pulp/pulp.yml".to_string());

    let mut help = String::new();
    help.push_str("Config:\n");
    help.push_str("  ./.pulp.yml, then ");
    help.push_str(&user_config);
    help.push_str("\n\n");
    help.push_str(&format!("Logs are written to: {}\n", get_log_path().display()));
    help
}
