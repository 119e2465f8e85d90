//! Pulp - document intelligence CLI
//!
//! Entry point: parses arguments, sets up logging, loads configuration and
//! dispatches to the subcommands.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, FromArgMatches};
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info};

use pulp::cli::{Cli, Command, generate_after_help};
use pulp::config::Config;
use pulp::document;
use pulp::llm::{LlmClient, create_client, create_client_from_resolved};
use pulp::repl;
use pulp::session::{Session, SessionServices};
use pulp::skill::{FsSkillStore, SkillStore};

const PING_TIMEOUT: Duration = Duration::from_secs(5);

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pulp")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("pulp.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Cli::command().after_help(generate_after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;

    info!(
        "Pulp loaded config: provider={}, model={}",
        config.llm.provider, config.llm.model
    );

    match cli.command {
        Some(Command::Run { file, instruction }) => cmd_run(&config, &file, &instruction).await,
        Some(Command::Chat { file }) => cmd_chat(&config, file.as_deref()).await,
        Some(Command::Skills) => cmd_skills(&config),
        Some(Command::Ping) => cmd_ping(&config).await,
        None => {
            let mut cmd = Cli::command().after_help(generate_after_help());
            cmd.print_help()?;
            Ok(())
        }
    }
}

fn open_skill_store(config: &Config) -> Result<Arc<dyn SkillStore>> {
    let dir = config.skills.path();
    let store = FsSkillStore::open(&dir).context(format!("Failed to read skills from {}", dir.display()))?;
    Ok(Arc::new(store))
}

fn build_services(config: &Config) -> Result<Arc<SessionServices>> {
    let llm = create_client(&config.llm).context("Failed to create LLM client")?;
    let store = open_skill_store(config)?;
    Ok(Arc::new(SessionServices::from_config(config, llm, store)?))
}

async fn open_document(config: &Config, file: &Path) -> Result<document::Document> {
    debug!(?file, "open_document: called");
    println!("{} {}", "Loading".dimmed(), file.display());
    let doc = document::load(file, &config.converter).await?;
    info!(title = %doc.title, words = doc.word_count, "Document loaded");
    Ok(doc)
}

/// Process a document once
async fn cmd_run(config: &Config, file: &Path, instruction: &str) -> Result<()> {
    // Load first so a bad path fails before any provider setup
    let doc = open_document(config, file).await?;
    let services = build_services(config)?;
    repl::run_once(Session::new(doc, services), instruction).await
}

/// Interactive session
async fn cmd_chat(config: &Config, file: Option<&Path>) -> Result<()> {
    let doc = match file {
        Some(path) => Some(open_document(config, path).await?),
        None => None,
    };
    let services = build_services(config)?;
    let session = match doc {
        Some(doc) => Session::new(doc, services),
        None => Session::chat(services),
    };
    repl::run_interactive(session).await
}

fn cmd_skills(config: &Config) -> Result<()> {
    let store = open_skill_store(config)?;
    println!("Skills directory: {}", config.skills.path().display());
    repl::print_skill_list(&store.list());
    Ok(())
}

async fn cmd_ping(config: &Config) -> Result<()> {
    let resolved = config.llm.resolve()?;
    let llm: Arc<dyn LlmClient> = create_client_from_resolved(&resolved).context("Failed to create LLM client")?;
    print!("Pinging {} ({})... ", llm.name(), resolved.model);
    let _ = std::io::Write::flush(&mut std::io::stdout());

    match tokio::time::timeout(PING_TIMEOUT, llm.ping()).await {
        Ok(Ok(())) => {
            println!("{}", "ok".green());
            Ok(())
        }
        Ok(Err(e)) => {
            println!("{}", "failed".red());
            Err(e).context("Provider health check failed")
        }
        Err(_) => {
            println!("{}", "timed out".red());
            eyre::bail!("No answer from {} within {:?}", llm.name(), PING_TIMEOUT)
        }
    }
}
