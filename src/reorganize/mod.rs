//! Date reorganization of packaged bundles
//!
//! Each archive `<root>/<tail>/DDD_ddd_<id>.tgz` is expanded and filed under
//! `<root>/<year>/<date>/DDD_ddd_<id>`. A symlink at `<root>/<tail>/DDD_ddd_<id>`
//! pointing at the dated directory is created last and marks the bundle done;
//! later scans skip any archive whose marker exists.
//!
//! A failure at any step abandons that bundle only. The archive stays where it
//! is, as does whatever the failed attempt left in the staging directory.

pub mod extract;

use crate::config::Config;
use crate::error::{Error, ReorganizeError, Result, display_chain};
use crate::layout::{self, Layout};
use crate::metadata::BundleMetadata;
use crate::types::{PaperId, ReorganizeOutcome, ReorganizeReport};
use crate::utils::{entry_metadata, remove_file_if_exists, symlink_dir};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

pub use extract::expand_archive;

/// Files expanded bundle archives by publication date
#[derive(Debug)]
pub struct DateReorganizer {
    config: Config,
    layout: Layout,
}

impl DateReorganizer {
    /// Create a reorganizer for `config.root`
    pub fn new(config: Config) -> Self {
        Self {
            layout: Layout::new(&config),
            config,
        }
    }

    /// Scan every tail directory once
    ///
    /// Only a failure to list the root or a tail directory ends the scan early.
    pub async fn run(&self) -> Result<ReorganizeReport> {
        let mut report = ReorganizeReport::default();

        for tail in self.tail_dirs().await? {
            for archive in bundle_archives(&tail).await? {
                let outcome = self.reorganize_bundle(&archive).await;
                report.record(&outcome);
            }
        }

        info!(
            reorganized = report.reorganized,
            already_done = report.already_done,
            failed = report.failed,
            "reorganization scan complete"
        );
        Ok(report)
    }

    /// Two-digit subdirectories of the root, sorted, symlinks excluded
    pub async fn tail_dirs(&self) -> Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        let mut entries = tokio::fs::read_dir(self.layout.root()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let is_tail = entry
                .file_name()
                .to_str()
                .is_some_and(layout::is_tail_dir_name);
            if is_tail && entry.file_type().await?.is_dir() {
                dirs.push(entry.path());
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    /// Reorganize the bundle behind one archive
    ///
    /// Never returns an error: failures are logged and reported as
    /// [`ReorganizeOutcome::Failed`] so the scan can go on.
    pub async fn reorganize_bundle(&self, archive: &Path) -> ReorganizeOutcome {
        let Some(paper_id) = archive
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(layout::parse_archive_name)
        else {
            return ReorganizeOutcome::Failed {
                reason: format!("{} is not a bundle archive", archive.display()),
            };
        };
        let marker = archive.with_file_name(layout::bundle_name(&paper_id));

        if tokio::fs::symlink_metadata(&marker).await.is_ok() {
            debug!(marker = ?marker, "bundle already reorganized");
            self.maybe_remove_archive(archive).await;
            return ReorganizeOutcome::AlreadyDone;
        }

        match self.relocate(archive, &paper_id, &marker).await {
            Ok(destination) => {
                info!(
                    archive = ?archive,
                    destination = ?destination,
                    "bundle reorganized"
                );
                self.maybe_remove_archive(archive).await;
                ReorganizeOutcome::Reorganized { destination }
            }
            Err(e) => {
                let reason = display_chain(&e);
                error!(archive = ?archive, error = %reason, "bundle left in place");
                ReorganizeOutcome::Failed { reason }
            }
        }
    }

    async fn relocate(&self, archive: &Path, paper_id: &PaperId, marker: &Path) -> Result<PathBuf> {
        let bundle = layout::bundle_name(paper_id);
        let staging_root = self.layout.staging_dir();
        let staging = staging_root.join(&bundle);

        if tokio::fs::symlink_metadata(&staging).await.is_ok() {
            warn!(staging = ?staging, "removing stale staging directory");
            tokio::fs::remove_dir_all(&staging).await?;
        }
        tokio::fs::create_dir_all(&staging).await?;

        let (archive_owned, staging_owned) = (archive.to_path_buf(), staging.clone());
        let written = tokio::task::spawn_blocking(move || {
            expand_archive(&archive_owned, &staging_owned)
        })
        .await
        .map_err(|e| Error::TaskFailed(format!("expansion task failed: {}", e)))??;
        debug!(archive = ?archive, files = written.len(), "archive expanded");

        let metadata_name = layout::metadata_name(paper_id);
        let metadata_path = staging.join(&metadata_name);
        if !tokio::fs::try_exists(&metadata_path).await? {
            return Err(ReorganizeError::MissingMetadata {
                archive: archive.to_path_buf(),
                expected: metadata_name,
            }
            .into());
        }
        let date = BundleMetadata::load(&metadata_path)
            .await?
            .publication_date()?;

        let destination = self.layout.dated_dir(&date.year, &date.date, &bundle);
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        match entry_metadata(&destination).await? {
            Some(existing) if existing.is_dir() => {
                warn!(
                    destination = ?destination,
                    "destination already filed; discarding fresh copy"
                );
                tokio::fs::remove_dir_all(&staging).await?;
            }
            Some(_) => {
                return Err(ReorganizeError::DestinationConflict { path: destination }.into());
            }
            None => tokio::fs::rename(&staging, &destination).await?,
        }

        symlink_dir(&destination, marker)?;
        Ok(destination)
    }

    async fn maybe_remove_archive(&self, archive: &Path) {
        if !self.config.reorganize.remove_archive {
            return;
        }
        if let Err(e) = remove_file_if_exists(archive) {
            warn!(archive = ?archive, error = %e, "could not remove archive");
        }
    }
}

/// Regular files in `dir` named like bundle archives, sorted
async fn bundle_archives(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut archives = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let named = entry
            .file_name()
            .to_str()
            .is_some_and(|n| layout::parse_archive_name(n).is_some());
        if named && entry.file_type().await?.is_file() {
            archives.push(entry.path());
        }
    }
    archives.sort();
    Ok(archives)
}
