//! Pulse CLI - Main entry point

use clap::Parser;
use pulse_cli::{Cli, Commands};
use pulse_common::logging::{init_logging, LogConfig, LogLevel};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Environment configures logging; --verbose forces debug level on top
    let log_config = match LogConfig::from_env() {
        Ok(config) if !cli.verbose => config,
        Ok(config) => config.with_level(LogLevel::Debug),
        Err(_) => LogConfig::default(),
    };

    // The CLI should keep working even if logging setup fails
    let _ = init_logging(&log_config.with_file_prefix("pulse"));

    match execute_command(cli).await {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

/// Execute the CLI command, returning the process exit code
async fn execute_command(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Commands::Load { full, partitions } => {
            let had_failures = pulse_cli::commands::load::run(full, partitions).await?;
            Ok(if had_failures { 1 } else { 0 })
        }

        Commands::Write {
            channel,
            input,
            date,
        } => {
            pulse_cli::commands::write::run(channel, input, date).await?;
            Ok(0)
        }

        Commands::InitDb => {
            pulse_cli::commands::init_db::run().await?;
            Ok(0)
        }

        Commands::Status => {
            pulse_cli::commands::status::run().await?;
            Ok(0)
        }
    }
}
