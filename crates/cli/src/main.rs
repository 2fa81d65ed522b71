//! Care Companion CLI
//!
//! Main entry point for the `care` command-line tool.
//! Runs grounded, self-verifying conversations for dementia caregivers.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, ChatCommand, PromptsCommand};
use care_core::{config::AppConfig, logging, AppResult};
use std::path::PathBuf;

/// Care Companion - grounded conversational support for dementia caregivers
#[derive(Parser, Debug)]
#[command(name = "care")]
#[command(about = "Grounded conversational support for dementia caregivers", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "CARE_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "CARE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// LLM provider (claude, ollama)
    #[arg(short, long, global = true, env = "CARE_PROVIDER")]
    provider: Option<String>,

    /// Answer model identifier
    #[arg(short, long, global = true, env = "CARE_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start an interactive conversation
    Chat(ChatCommand),

    /// Ask a single question
    Ask(AskCommand),

    /// List or show prompt definitions
    Prompts(PromptsCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    let config = AppConfig::load()?.with_overrides(
        cli.workspace,
        cli.config,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    // Logs go to stderr; stdout carries the conversation
    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("Care Companion CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {} (fast: {})", config.model, config.fast_model());

    let command_name = match &cli.command {
        Commands::Chat(_) => "chat",
        Commands::Ask(_) => "ask",
        Commands::Prompts(_) => "prompts",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Chat(cmd) => cmd.execute(&config).await,
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Prompts(cmd) => cmd.execute(&config),
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
