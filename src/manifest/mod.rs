//! Manifest lifecycle processing
//!
//! A manifest lists the metadata documents of a batch of bundles, one path per
//! line. Manifests move through three directories and each move is a rename:
//!
//! ```text
//! manifests/  --begin-->  in_progress/  --finish-->  ocr_complete/
//! ```
//!
//! A manifest is renamed into `in_progress/` before any of its bundles is
//! touched and out of it only after all of them are done. A run that dies in
//! between leaves the manifest in `in_progress/`, where it stays until an
//! operator moves it back; it is never picked up again automatically.

mod bundle;
pub mod package;

use crate::clock::{self, SharedClock};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetcher::ResourceFetcher;
use crate::layout::Layout;
use crate::types::{BundleOutcome, HarvestReport, ManifestReport};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Drives manifests from the todo directory to the finished directory
#[derive(Debug)]
pub struct ManifestProcessor {
    config: Config,
    layout: Layout,
    fetcher: ResourceFetcher,
    clock: SharedClock,
}

impl ManifestProcessor {
    /// Create a processor for `config.root`
    pub fn new(config: Config) -> Result<Self> {
        let fetcher = ResourceFetcher::new(&config.fetch)?;
        Ok(Self {
            layout: Layout::new(&config),
            config,
            fetcher,
            clock: clock::system(),
        })
    }

    /// Use `clock` for error log timestamps
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Process manifests until the todo directory is empty
    ///
    /// The todo directory is listed again after every manifest, so manifests
    /// added or removed meanwhile are noticed.
    pub async fn run(&self) -> Result<HarvestReport> {
        self.prepare_directories().await?;

        for stuck in self.stuck_manifests().await? {
            warn!(manifest = ?stuck, "manifest left in progress by an earlier run");
        }

        let mut report = HarvestReport::default();
        while let Some(name) = self.next_manifest().await? {
            let manifest = self.advance(&name).await?;
            report.manifests += 1;
            report.totals.merge(&manifest);
        }

        info!(
            manifests = report.manifests,
            bundles_packaged = report.totals.bundles_packaged,
            bundles_failed = report.totals.bundles_failed,
            resources_failed = report.totals.resources_failed,
            "no manifests left"
        );
        Ok(report)
    }

    /// Create the three lifecycle directories if needed
    pub async fn prepare_directories(&self) -> Result<()> {
        for dir in [
            self.layout.todo_dir(),
            self.layout.progress_dir(),
            self.layout.finished_dir(),
        ] {
            tokio::fs::create_dir_all(&dir).await?;
        }
        Ok(())
    }

    /// Manifests sitting in the progress directory
    pub async fn stuck_manifests(&self) -> Result<Vec<PathBuf>> {
        let progress = self.layout.progress_dir();
        Ok(list_manifests(&progress)
            .await?
            .into_iter()
            .map(|name| progress.join(name))
            .collect())
    }

    /// The first manifest in the todo directory, by name
    pub async fn next_manifest(&self) -> Result<Option<String>> {
        Ok(list_manifests(&self.layout.todo_dir())
            .await?
            .into_iter()
            .next())
    }

    /// Move one manifest through all three stages
    pub async fn advance(&self, name: &str) -> Result<ManifestReport> {
        let working = self.begin(name).await?;
        info!(manifest = %name, "processing manifest");
        let report = self.process_manifest(&working).await?;
        self.finish(name).await?;
        info!(
            manifest = %name,
            bundles_packaged = report.bundles_packaged,
            bundles_skipped = report.bundles_skipped,
            bundles_failed = report.bundles_failed,
            resources_fetched = report.resources_fetched,
            resources_failed = report.resources_failed,
            "manifest complete"
        );
        Ok(report)
    }

    /// Rename a manifest from the todo into the progress directory
    pub async fn begin(&self, name: &str) -> Result<PathBuf> {
        let from = self.layout.todo_dir().join(name);
        let to = self.layout.progress_dir().join(name);
        stage_rename(&from, &to).await?;
        Ok(to)
    }

    /// Rename a manifest from the progress into the finished directory
    pub async fn finish(&self, name: &str) -> Result<PathBuf> {
        let from = self.layout.progress_dir().join(name);
        let to = self.layout.finished_dir().join(name);
        stage_rename(&from, &to).await?;
        Ok(to)
    }

    /// Process every bundle listed in the manifest at `path`
    ///
    /// Per-bundle failures are logged and counted. Only failures that would
    /// affect every later bundle too (disk space, unwritable archives or error
    /// logs) are returned as errors.
    pub async fn process_manifest(&self, path: &Path) -> Result<ManifestReport> {
        let contents = tokio::fs::read_to_string(path).await?;
        let mut report = ManifestReport::default();

        for line in contents.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let metadata_path = self.layout.resolve_manifest_entry(line);
            let outcome = self.process_bundle(&metadata_path).await?;
            if let BundleOutcome::Failed { reason } = &outcome {
                error!(bundle = ?metadata_path, reason = %reason, "bundle not processed");
            }
            report.record(&outcome);
        }

        Ok(report)
    }
}

async fn stage_rename(from: &Path, to: &Path) -> Result<()> {
    tokio::fs::rename(from, to)
        .await
        .map_err(|source| Error::StageTransition {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        })
}

/// Regular, non-hidden files in `dir`, sorted by name
async fn list_manifests(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if !name.starts_with('.') {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}
