//! # ocr-harvest
//!
//! Crash-safe harvesting of newspaper OCR text into dated bundle archives.
//!
//! The pipeline consists of four components that run as separate processes
//! against one archive root and coordinate only through the filesystem:
//!
//! - [`ManifestProcessor`] works through manifests of bundle metadata documents,
//!   fetches each bundle's OCR resources and packages them into an archive
//! - [`RetryQueueManager`] retries single resources listed in the queue file
//! - [`import_failure_logs`] moves the entries of per-bundle error logs into
//!   the queue
//! - [`DateReorganizer`] files packaged archives under `year/date/`
//!
//! Every state change is a rename or a symlink creation, so a process killed at
//! any point can be restarted without losing or duplicating work.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ocr_harvest::{Config, DateReorganizer, ManifestProcessor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::for_root("/data/kranten");
//!     config.validate()?;
//!
//!     let report = ManifestProcessor::new(config.clone())?.run().await?;
//!     println!("{} manifests done", report.manifests);
//!
//!     DateReorganizer::new(config).run().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Clock abstraction
pub mod clock;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Per-bundle error logs
pub mod failure_log;
/// Checksum-verified resource downloads
pub mod fetcher;
/// On-disk naming conventions
pub mod layout;
/// Manifest lifecycle processing
pub mod manifest;
/// Metadata document parsing
pub mod metadata;
/// Retry queue
pub mod queue;
/// Date reorganization of bundle archives
pub mod reorganize;
/// Retry logic with fixed or capped backoff
pub mod retry;
/// Core types and reports
pub mod types;
/// Utility functions
pub mod utils;

pub use clock::{Clock, FixedClock, SharedClock, SystemClock};
pub use config::Config;
pub use error::{Error, FetchError, MetadataError, ReorganizeError, Result, display_chain};
pub use fetcher::ResourceFetcher;
pub use layout::Layout;
pub use manifest::ManifestProcessor;
pub use metadata::BundleMetadata;
pub use queue::{QueueFile, RetryQueueManager, import_failure_logs};
pub use reorganize::DateReorganizer;
pub use types::{
    BundleOutcome, Checksum, ChecksumAlgorithm, FetchedResource, HarvestReport, ImportReport,
    ItemOutcome, ManifestReport, PaperId, PassReport, QueueEntry, QueueReport, ReorganizeOutcome,
    ReorganizeReport, WorkItem,
};

/// Drive `fut` to completion unless a termination signal arrives first.
///
/// Returns `None` when interrupted. The future is dropped at its current
/// await point; callers flush whatever state they need to afterwards.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use ocr_harvest::{Config, DateReorganizer, run_until_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let reorganizer = DateReorganizer::new(Config::for_root("/data/kranten"));
///     if let Some(report) = run_until_shutdown(reorganizer.run()).await {
///         println!("{} bundles filed", report?.reorganized);
///     }
///     Ok(())
/// }
/// ```
pub async fn run_until_shutdown<F: std::future::Future>(fut: F) -> Option<F::Output> {
    tokio::select! {
        output = fut => Some(output),
        _ = wait_for_signal() => None,
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
