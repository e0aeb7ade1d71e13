//! sequor CLI - command-line interface for the sequor sequence engine.

mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

/// sequor - run user-authored control-flow sequences.
#[derive(Parser)]
#[command(name = "sequor")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the validity of a sequence file
    Check {
        /// Path to the sequence YAML file
        file: String,
    },

    /// Run a sequence file against the built-in demo functions
    Run {
        /// Path to the sequence YAML file
        file: String,

        /// Worker pool size for function nodes
        #[arg(short, long, default_value = "8")]
        workers: usize,

        /// Default timeout in milliseconds for function nodes without one
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| filter.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(log_filter))
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Check { file } => commands::check::run(&file),
        Commands::Run {
            file,
            workers,
            timeout_ms,
        } => commands::run::run(&file, workers, timeout_ms).await,
    }
}
