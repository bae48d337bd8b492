//! AML Ingest - bulk-upload ingestion worker

use aml_common::logging::{init_logging, LogConfig, LogLevel};
use aml_ingest::{
    config::Config,
    db::{postgres, Database, PgDatabase},
    ingest::{Pipeline, ProcessOutcome, Scheduler},
    storage::{BlobTransport, HttpTransport, ObjectStore, S3ObjectStore, StorageConfig},
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "aml-ingest")]
#[command(author, version, about = "AML bulk-upload ingestion worker")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Poll for open processes until interrupted
    Run,

    /// Run a single process once
    Process {
        /// Process id to run
        process_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("aml-ingest")
        .build();

    // Environment variables take precedence when set
    let log_config = if std::env::var("LOG_LEVEL").is_ok() {
        LogConfig::from_env().unwrap_or(log_config)
    } else {
        log_config
    };

    let _guard = init_logging(&log_config)?;

    let config = Config::load().context("Failed to load configuration")?;
    let storage_config = StorageConfig::from_env().context("Failed to load storage configuration")?;

    let pool = postgres::create_pool(&config.database).await?;
    postgres::run_migrations(&pool).await?;
    info!("Database ready");

    let db: Arc<dyn Database> = Arc::new(PgDatabase::new(pool));
    let store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(storage_config));
    let transport: Arc<dyn BlobTransport> = Arc::new(HttpTransport::new(config.ingest.http_timeout())?);
    let pipeline = Arc::new(Pipeline::new(db, store, transport, Arc::new(config.ingest)));

    match cli.command {
        Command::Run => {
            let shutdown = CancellationToken::new();
            let handle = Scheduler::new(pipeline).start(shutdown.clone());

            shutdown_signal().await;
            info!("Shutdown requested, finishing current sweep");
            shutdown.cancel();
            handle.await?;
        },
        Command::Process { process_id } => {
            let Some(process) = pipeline.db().find_process(&process_id).await? else {
                bail!("Process {} not found", process_id);
            };
            if process.status.is_terminal() {
                bail!("Process {} is already {}", process_id, process.status);
            }

            match pipeline.run(&process).await? {
                ProcessOutcome::Completed(summary) => {
                    info!(promoted = summary.total(), "Process completed");
                },
                ProcessOutcome::Failed(failure) => {
                    bail!("Process {} failed: {}", process_id, failure);
                },
            }
        },
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
