//! kscout - ownership, relationship, drift and anti-pattern analysis for
//! Kubernetes resources
//!
//! Reads a snapshot from the current kubeconfig context or from YAML/JSON
//! files and prints the requested part of the analysis.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Command, RunArgs};
use kscout::config::ConfigLoader;
use std::process::ExitCode;

/// kscout - who manages what in your cluster, and what is wrong with it
#[derive(Parser, Debug)]
#[command(name = "kscout", version)]
#[command(about = "Ownership, relationship, drift and anti-pattern analysis for Kubernetes resources", long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(long, short = 'd', global = true)]
    debug: bool,

    /// Write debug logs to a temporary file instead of stderr
    #[arg(long = "log-file", global = true)]
    log_file: bool,

    #[command(flatten)]
    run: RunArgs,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let log_file = cli::init_logging(args.debug, args.log_file);
    if let Some(ref log_path) = log_file {
        eprintln!(
            "Debug logging enabled. Logs written to: {}",
            log_path.display()
        );
    }

    let command = match args.command {
        Command::Config { subcommand } => {
            cli::handle_config_command(subcommand)?;
            return Ok(ExitCode::SUCCESS);
        }
        command => command,
    };

    let config = ConfigLoader::load().context("Failed to load configuration")?;
    ConfigLoader::check(&config).context("Invalid configuration")?;
    tracing::debug!(
        "Configuration loaded: workers={}, timeout={}s, minSeverity={}",
        config.analysis.workers,
        config.analysis.timeout_seconds,
        config.scan.min_severity
    );

    if cli::run_command(command, &args.run, config).await? {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
