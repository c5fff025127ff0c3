//! Metagente - multi-agent prompt optimization
//!
//! Main entry point for the Metagente CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{config, evaluate, optimize};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Metagente - multi-agent prompt optimization for repository descriptions
#[derive(Parser)]
#[command(name = "metagente")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory holding config.toml and logs/
    #[arg(long, global = true, env = "METAGENTE_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Refine the summarizer instruction over a training dataset
    Optimize(optimize::OptimizeArgs),

    /// Score a fixed summarizer instruction over a dataset
    Evaluate(evaluate::EvaluateArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_dir = cli.config_dir.clone().or_else(metagente_config::xdg_config_dir);

    // Console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "metagente=debug,metagente_optimizer=debug,metagente_llm=debug,metagente_config=debug,info"
    } else {
        "metagente=info,metagente_optimizer=info,metagente_llm=warn,warn"
    };

    let log_dir = config_dir
        .as_ref()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "metagente.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "metagente=trace,metagente_optimizer=trace,metagente_llm=debug,metagente_config=debug,info",
                )),
        )
        .init();

    let ctx = commands::Context {
        config_dir,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Optimize(args) => optimize::run(args, &ctx).await,
        Commands::Evaluate(args) => evaluate::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
