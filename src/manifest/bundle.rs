//! Fetch, package and clean up one bundle

use super::ManifestProcessor;
use super::package::{self, Member};
use crate::error::{Result, display_chain};
use crate::failure_log;
use crate::layout;
use crate::metadata::BundleMetadata;
use crate::retry::with_retry;
use crate::types::BundleOutcome;
use crate::utils::{check_disk_space, remove_file_if_exists};
use std::path::Path;
use tracing::{debug, info, warn};

impl ManifestProcessor {
    /// Fetch the OCR resources of a bundle and package them with its metadata
    ///
    /// Resources that keep failing are written to the bundle's error log and
    /// left out of the archive. Source files are deleted only once the archive
    /// is in place; the metadata document goes last, so while it exists the
    /// bundle counts as not yet packaged.
    pub async fn process_bundle(&self, metadata_path: &Path) -> Result<BundleOutcome> {
        let Some(file_name) = metadata_path.file_name().and_then(|n| n.to_str()) else {
            return Ok(failed("manifest entry has no file name"));
        };
        let Some(paper_id) = layout::parse_metadata_name(file_name) else {
            return Ok(failed(format!("{} is not a bundle metadata document", file_name)));
        };
        let Some(dir) = metadata_path.parent() else {
            return Ok(failed("manifest entry has no parent directory"));
        };
        let archive = dir.join(layout::archive_name(&paper_id));

        if !tokio::fs::try_exists(metadata_path).await? {
            if tokio::fs::try_exists(&archive).await? {
                debug!(archive = ?archive, "bundle already packaged");
                return Ok(BundleOutcome::AlreadyPackaged { archive });
            }
            return Ok(failed(format!(
                "metadata document {} is missing",
                metadata_path.display()
            )));
        }

        let metadata = match BundleMetadata::load(metadata_path).await {
            Ok(metadata) => metadata,
            Err(e) => return Ok(failed(display_chain(&e))),
        };

        let mut members = vec![Member {
            path: metadata_path.to_path_buf(),
            name: file_name.to_string(),
        }];
        let mut failed_count = 0;
        let error_log = self.layout.error_log(dir);

        for entry in metadata.ocr_resources() {
            match with_retry(&self.config.retry, || self.fetcher.fetch_entry(entry, dir)).await {
                Ok(fetched) => {
                    if members.iter().any(|m| m.name == fetched.name) {
                        continue;
                    }
                    members.push(Member {
                        path: fetched.path,
                        name: fetched.name,
                    });
                }
                Err(exhausted) => {
                    failed_count += 1;
                    let filename = entry.filename.as_deref().unwrap_or("undetermined");
                    warn!(
                        filename,
                        attempts = exhausted.attempts,
                        error = %display_chain(&exhausted.error),
                        "resource left out of bundle"
                    );
                    let record = failure_log::format_entry(
                        filename,
                        exhausted.attempts,
                        self.clock.now(),
                        &exhausted.error,
                    );
                    failure_log::append_entry(&error_log, &record).await?;
                }
            }
        }

        let size = package::total_size(&members).await?;
        check_disk_space(&self.config.disk_space, dir, size)?;

        let fetched = members.len() - 1;
        package::write_archive(&archive, members.clone()).await?;

        for member in members.iter().skip(1).chain(members.first()) {
            if let Err(e) = remove_file_if_exists(&member.path) {
                warn!(path = ?member.path, error = %e, "could not remove packaged source");
            }
        }

        info!(
            archive = ?archive,
            fetched,
            failed = failed_count,
            "bundle packaged"
        );
        Ok(BundleOutcome::Packaged {
            archive,
            fetched,
            failed: failed_count,
        })
    }
}

fn failed(reason: impl Into<String>) -> BundleOutcome {
    BundleOutcome::Failed {
        reason: reason.into(),
    }
}
