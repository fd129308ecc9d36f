//! Chain Archiver - Main entry point

use anyhow::Context;
use archiver::{Cli, Commands};
use archiver_common::logging::{init_logging, LogConfig, LogLevel};
use clap::Parser;
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // .env is optional; real environment variables win
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let result = match init(&cli) {
        Ok(_guard) => execute_command(&cli).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        error!(error = %e, "Command failed");
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn init(cli: &Cli) -> anyhow::Result<archiver_common::logging::LoggingGuard> {
    let level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::builder()
        .level(level)
        .build()
        .merge_env()
        .context("invalid logging configuration")?;

    init_logging(&log_config).context("failed to initialise logging")
}

/// Execute the CLI command
async fn execute_command(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Run { archive } => {
            let cancel = CancellationToken::new();
            tokio::spawn(shutdown_on_signal(cancel.clone()));

            archiver::commands::run::run(archive, cancel)
                .await
                .context("archiver failed")
        }

        Commands::Manifest {
            archive,
            date,
            json,
        } => archiver::commands::manifest::run(archive, *date, *json)
            .await
            .with_context(|| format!("failed to build manifest for {date}")),
    }
}

async fn shutdown_on_signal(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for interrupt");
        return;
    }
    info!("interrupt received, shutting down");
    cancel.cancel();
}
