//! CLI arguments and dispatch.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands;

/// Top-level CLI arguments.
#[derive(Parser)]
#[command(name = "helix")]
#[command(version, about = "Multi-model debate orchestrator", long_about = None)]
pub struct Cli {
    /// Path to configuration file (.toml, .json, or .json5)
    #[arg(long, global = true, default_value = "helix.toml")]
    pub config: String,

    /// Enable verbose output
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run one prompt through the debate (or a single provider)
    Ask(commands::AskArgs),
    /// Probe every configured model and print the scored table
    Verify,
    /// Print the current provider/model snapshot
    Models,
}

pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        match cli.command {
            Commands::Ask(args) => commands::ask(&cli.config, args).await,
            Commands::Verify => commands::verify(&cli.config).await,
            Commands::Models => commands::models(&cli.config).await,
        }
    })
}
