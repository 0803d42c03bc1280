//! IBVL Import - variant catalog loader

use anyhow::{Context, Result};
use clap::Parser;
use ibvl_common::logging::{init_logging, LogConfig, LogLevel};
use ibvl_import::config::ImportConfig;
use ibvl_import::job::Job;
use ibvl_import::sink::postgres::{create_pool, PgSink};
use ibvl_import::{Orchestrator, PkStore};
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "ibvl-import")]
#[command(author, version, about = "Load IBVL export files into the variant catalog")]
struct Cli {
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Root directory with one subdirectory per entity type
    #[arg(long)]
    input: Option<String>,

    /// Rows per insert chunk
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Skip entity types before this one
    #[arg(long)]
    start_at_model: Option<String>,

    /// Skip files before this one
    #[arg(long)]
    start_at_file: Option<String>,

    /// Read initial key maps from this job number
    #[arg(long)]
    copy_maps_from_job: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ImportConfig::from_env().context("Invalid import configuration")?;
    if let Some(input) = cli.input {
        config.run.input_root = input.into();
    }
    if let Some(chunk_size) = cli.chunk_size {
        config.run.chunk_size = chunk_size;
    }
    if cli.start_at_model.is_some() {
        config.run.start_at_model = cli.start_at_model;
    }
    if cli.start_at_file.is_some() {
        config.run.start_at_file = cli.start_at_file;
    }
    if cli.copy_maps_from_job.is_some() {
        config.copy_maps_from_job = cli.copy_maps_from_job;
    }
    config.validate().context("Invalid import configuration")?;

    let job = Job::open(&config.jobs_root, config.copy_maps_from_job.as_deref())?;

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    // Environment variables take precedence
    let log_config = LogConfig::builder().level(log_level).build().merge_env()?;
    let _guard = init_logging(&log_config, Some(&job.dir))?;

    info!(
        job = job.number,
        dir = %job.dir.display(),
        input = %config.run.input_root.display(),
        chunk_size = config.run.chunk_size,
        "Starting import"
    );
    if job.copies_maps() {
        info!(load_dir = %job.load_dir.display(), "Loading initial pk maps from an earlier job");
    }

    let pool = create_pool(&config.database)
        .await
        .context("Failed to connect to the database")?;
    let sink = PgSink::new(pool, config.schema.clone());
    let store = PkStore::new(&job.dir, &job.load_dir);

    let mut orchestrator = Orchestrator::new(sink, store, config.run.clone());
    let summary = orchestrator.run_until(shutdown_signal()).await?;
    orchestrator.sink().close().await;

    if summary.interrupted {
        warn!("Import interrupted; resume with a new job and COPY_MAPS_FROM_JOB={}", job.number);
    } else {
        info!("Import complete");
    }
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, saving progress");
        },
        _ = terminate => {
            info!("Received terminate signal, saving progress");
        },
    }
}
