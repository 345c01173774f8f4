//! PromptWeave CLI: the main entry point.
//!
//! Commands:
//! - `init`      Write a default config and module directory
//! - `assemble`  Build the prompt for one message
//! - `manifest`  Validate a family/arm manifest
//! - `matrix`    Check a selection matrix
//! - `status`    Show configuration and module roots

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "promptweave",
    about = "PromptWeave: token-bounded prompt assembly from reusable modules",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file (defaults to ~/.promptweave/config.toml)
    #[arg(short, long, global = true, env = "PROMPTWEAVE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config and create the module directory
    Init,

    /// Assemble the prompt for one message
    Assemble(commands::assemble::AssembleArgs),

    /// Manifest tools
    Manifest {
        #[command(subcommand)]
        command: ManifestCommands,
    },

    /// Selection matrix tools
    Matrix {
        #[command(subcommand)]
        command: MatrixCommands,
    },

    /// Show configuration, module roots and declarative documents
    Status,
}

#[derive(Subcommand)]
enum ManifestCommands {
    /// Parse and validate a manifest file
    Validate { path: PathBuf },
}

#[derive(Subcommand)]
enum MatrixCommands {
    /// Parse a selection matrix and compile its rules
    Check { path: PathBuf },
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Init => commands::init::run(config_path).await?,
        Commands::Assemble(args) => commands::assemble::run(config_path, args).await?,
        Commands::Manifest {
            command: ManifestCommands::Validate { path },
        } => commands::manifest::validate(&path).await?,
        Commands::Matrix {
            command: MatrixCommands::Check { path },
        } => commands::matrix::check(&path).await?,
        Commands::Status => commands::status::run(config_path).await?,
    }

    Ok(())
}
