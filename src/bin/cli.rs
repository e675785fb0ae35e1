//! s3sync CLI
//!
//! Single `run` command plus `init` for writing a starter config.
//! Exit code 0 only when a run completes with zero failures.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use s3sync::pipeline::Pipeline;
use s3sync::remote::S3ObjectStore;
use s3sync::types::SyncMode;
use s3sync::SyncConfig;

#[derive(Parser)]
#[command(name = "s3sync")]
#[command(about = "Incremental S3-to-local mirror")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(long, env = "S3SYNC_CONFIG", default_value = "config/default_config.yaml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync pass
    Run {
        /// Override the configured sync mode
        #[arg(short, long)]
        mode: Option<SyncMode>,
        /// Override the configured worker count
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Write a starter configuration file
    Init,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(success) => {
            if success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    match cli.command {
        Commands::Init => {
            SyncConfig::write_template(&cli.config)?;
            println!("Wrote starter configuration to {}", cli.config);
            Ok(true)
        }
        Commands::Run { mode, workers } => {
            let mut config = SyncConfig::load(&cli.config)?;
            if let Some(mode) = mode {
                config.sync.mode = mode;
            }
            if let Some(workers) = workers {
                config.sync.threads = workers.max(1);
            }

            tracing::info!(
                version = s3sync::VERSION,
                mode = %config.sync.mode,
                workers = config.sync.threads,
                "starting sync run"
            );

            let store = Arc::new(S3ObjectStore::connect().await?);
            let pipeline = Pipeline::new(store, config);

            let cancel = CancellationToken::new();
            let signal_cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupt received, stopping dispatch");
                    signal_cancel.cancel();
                }
            });

            let summary = pipeline.run(cancel).await?;
            println!("{summary}");
            for (key, error) in &summary.failures {
                eprintln!("failed: {key}: {error}");
            }
            Ok(summary.is_success())
        }
    }
}
