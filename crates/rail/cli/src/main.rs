//! RAIL CLI - Command-line tools for governance manifests
//!
//! This CLI lets policy authors and operators:
//! - Validate, hash and inspect manifest documents
//! - Verify the hash chain across manifest versions
//! - Evaluate job contexts against a manifest
//! - Replay recorded contexts through a candidate manifest before promotion

use anyhow::Context;
use clap::{Parser, Subcommand};
use rail_runtime::GovernanceConfig;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod output;

use commands::{evaluate, manifest, shadow};

/// RAIL CLI application
#[derive(Parser)]
#[command(name = "railctl")]
#[command(about = "RAIL - Execution governance manifest tooling", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "RAIL_CONFIG")]
    config: Option<PathBuf>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table")]
    output: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Inspect manifest documents
    Manifest {
        #[command(subcommand)]
        command: manifest::ManifestCommands,
    },

    /// Evaluate job contexts against a manifest
    #[command(alias = "eval")]
    Evaluate {
        /// Manifest JSON file
        #[arg(short, long)]
        manifest: PathBuf,

        /// Job contexts: one object, an array, or one object per line
        #[arg(short = 'j', long)]
        contexts: PathBuf,
    },

    /// Replay job contexts through a candidate manifest
    Shadow {
        /// Currently active manifest
        #[arg(short, long)]
        active: PathBuf,

        /// Candidate manifest
        #[arg(short = 'n', long)]
        candidate: PathBuf,

        /// Recorded job contexts
        #[arg(short = 'j', long)]
        contexts: PathBuf,

        /// Skip the minimum shadow duration check
        #[arg(long)]
        ignore_duration: bool,

        /// Include the recorded sample comparisons
        #[arg(long)]
        samples: bool,
    },

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; stdout is reserved for command output
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();

    let config = GovernanceConfig::load(cli.config.as_deref())
        .context("failed to load configuration")?;
    debug!(path = ?cli.config, "Configuration loaded");

    match cli.command {
        Commands::Manifest { command } => manifest::execute(command, cli.output).await,

        Commands::Evaluate { manifest, contexts } => {
            evaluate::execute(&manifest, &contexts, cli.output).await
        }

        Commands::Shadow {
            active,
            candidate,
            contexts,
            ignore_duration,
            samples,
        } => {
            let args = shadow::ShadowArgs {
                active: &active,
                candidate: &candidate,
                contexts: &contexts,
                ignore_duration,
                samples,
            };
            shadow::execute(args, config.shadow, cli.output).await
        }

        Commands::Config => output::print_json(&config),
    }
}
