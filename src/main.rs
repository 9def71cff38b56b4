//! ocr-harvest: crash-safe newspaper OCR harvesting.
//!
//! Each subcommand runs one pipeline component against an archive root. The
//! components may run at the same time as separate processes.

use clap::{Parser, Subcommand};
use ocr_harvest::clock;
use ocr_harvest::utils::ensure_root_accessible;
use ocr_harvest::{
    Config, DateReorganizer, ManifestProcessor, Result, RetryQueueManager, display_chain,
    import_failure_logs, run_until_shutdown,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// File under the root receiving reorganization errors
const REORGANIZE_ERROR_LOG: &str = "reorganize_errors.log";

/// Newspaper OCR harvesting pipeline.
#[derive(Parser, Debug)]
#[command(name = "ocr-harvest")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process manifests: fetch, package and clean up bundles
    Harvest {
        /// Archive root
        root: PathBuf,
    },
    /// Work through the retry queue
    Retry {
        /// Archive root
        root: PathBuf,
    },
    /// File packaged bundles by publication date
    Reorganize {
        /// Archive root
        root: PathBuf,
    },
    /// Append the entries of per-bundle error logs to the retry queue
    ImportFailures {
        /// Archive root
        root: PathBuf,
    },
}

impl Command {
    fn root(&self) -> &Path {
        match self {
            Command::Harvest { root }
            | Command::Retry { root }
            | Command::Reorganize { root }
            | Command::ImportFailures { root } => root,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let root = match ensure_root_accessible(args.command.root()) {
        Ok(root) => root,
        Err(e) => {
            eprintln!("error: {}", display_chain(&e));
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_tracing(&args, &root) {
        eprintln!("error: could not open {}: {}", REORGANIZE_ERROR_LOG, e);
        return ExitCode::FAILURE;
    }

    match run(&args, root).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let message = display_chain(&e);
            tracing::error!(error = %message, "aborting");
            eprintln!("error: {}", message);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(args: &Args, root: &Path) -> std::io::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    let error_file = match args.command {
        Command::Reorganize { .. } => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(root.join(REORGANIZE_ERROR_LOG))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file))
                    .with_filter(LevelFilter::ERROR),
            )
        }
        _ => None,
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_filter(filter))
        .with(error_file)
        .init();
    Ok(())
}

fn build_config(args: &Args, root: PathBuf) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.root = root;
    config.validate()?;
    Ok(config)
}

async fn run(args: &Args, root: PathBuf) -> Result<()> {
    let config = build_config(args, root)?;
    info!(root = ?config.root, "ocr-harvest starting");

    match args.command {
        Command::Harvest { .. } => {
            let processor = ManifestProcessor::new(config)?;
            match run_until_shutdown(processor.run()).await {
                Some(report) => {
                    let report = report?;
                    info!(
                        manifests = report.manifests,
                        bundles_packaged = report.totals.bundles_packaged,
                        resources_failed = report.totals.resources_failed,
                        "harvest finished"
                    );
                }
                None => warn!("interrupted; the current manifest stays in progress"),
            }
        }
        Command::Retry { .. } => {
            let mut manager = RetryQueueManager::new(&config)?;
            let outcome = run_until_shutdown(manager.run()).await;
            match outcome {
                Some(Ok(report)) => info!(
                    passes = report.passes,
                    fetched = report.fetched,
                    remaining = report.remaining,
                    "retry queue finished"
                ),
                Some(Err(e)) => {
                    if let Err(flush) = manager.persist() {
                        warn!(error = %display_chain(&flush), "could not save pending entries");
                    }
                    return Err(e);
                }
                None => {
                    manager.persist()?;
                    warn!(remaining = manager.len(), "interrupted; pending entries saved");
                }
            }
        }
        Command::Reorganize { .. } => {
            let reorganizer = DateReorganizer::new(config);
            if let Some(report) = run_until_shutdown(reorganizer.run()).await {
                report?;
            } else {
                warn!("interrupted");
            }
        }
        Command::ImportFailures { .. } => {
            let report = import_failure_logs(&config, clock::system().as_ref()).await?;
            info!(
                logs = report.logs,
                imported = report.imported,
                duplicates = report.duplicates,
                "failure logs imported"
            );
        }
    }

    Ok(())
}
