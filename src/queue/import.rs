//! Feeding per-bundle error logs back into the retry queue
//!
//! Run this while the queue manager is stopped: it rewrites the queue file.

use crate::clock::{self, Clock};
use crate::config::Config;
use crate::error::Result;
use crate::failure_log;
use crate::layout::{self, Layout};
use crate::queue::file::QueueFile;
use crate::types::{ImportReport, QueueEntry, WorkItem};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Append the resources named in every bundle error log to the queue
///
/// Filenames already queued are skipped. The queue file is written before any
/// log is renamed, so an interrupted import can simply be run again. Consumed
/// logs are renamed to `<log>.<timestamp>.imported`.
pub async fn import_failure_logs(config: &Config, clock: &dyn Clock) -> Result<ImportReport> {
    let layout = Layout::new(config);
    let logs = find_error_logs(&layout).await?;
    let mut report = ImportReport::default();

    if logs.is_empty() {
        info!("no error logs to import");
        return Ok(report);
    }

    let queue = QueueFile::new(layout.queue_file());
    let mut entries = queue.load()?;
    let mut queued: HashSet<String> = entries
        .iter()
        .filter_map(|e| e.filename().map(str::to_string))
        .collect();

    for log in &logs {
        let contents = tokio::fs::read_to_string(log).await?;
        for header in failure_log::entry_headers(&contents) {
            if layout::parse_article(&header).is_none() {
                debug!(log = ?log, header = %header, "ignoring non-resource entry");
                report.ignored += 1;
            } else if queued.insert(header.clone()) {
                entries.push(QueueEntry::Item(WorkItem::new(header)));
                report.imported += 1;
            } else {
                report.duplicates += 1;
            }
        }
    }

    queue.persist(&entries)?;

    let stamp = clock::file_stamp(clock.now());
    for log in &logs {
        let mut consumed = log.clone().into_os_string();
        consumed.push(format!(".{}.imported", stamp));
        if let Err(e) = tokio::fs::rename(log, &consumed).await {
            // the next import skips what is already queued
            warn!(log = ?log, error = %e, "could not mark error log as imported");
            continue;
        }
        report.logs += 1;
    }

    info!(
        logs = report.logs,
        imported = report.imported,
        duplicates = report.duplicates,
        ignored = report.ignored,
        "error logs imported"
    );
    Ok(report)
}

/// Error logs of every bundle subdirectory, in name order
async fn find_error_logs(layout: &Layout) -> Result<Vec<PathBuf>> {
    let mut logs = Vec::new();
    let mut dir = tokio::fs::read_dir(layout.root()).await?;
    while let Some(entry) = dir.next_entry().await? {
        let name = entry.file_name();
        let is_tail = name.to_str().is_some_and(layout::is_tail_dir_name);
        if !is_tail || !entry.file_type().await?.is_dir() {
            continue;
        }
        let log = layout.error_log(&entry.path());
        if tokio::fs::try_exists(&log).await? {
            logs.push(log);
        }
    }
    logs.sort();
    Ok(logs)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn test_import_appends_new_filenames_and_renames_logs() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("01")).unwrap();
        std::fs::create_dir_all(root.join("02")).unwrap();
        std::fs::write(
            root.join("missing.txt"),
            "DDD_010000001_0001_articletext.xml\n",
        )
        .unwrap();
        std::fs::write(
            root.join("01").join("failures.log"),
            "DDD_010000001_0001_articletext.xml\nattempts: 5\n\n\
             DDD_010000001_0003_articletext.xml\nattempts: 5\n\n\
             undetermined\nboom\n\n",
        )
        .unwrap();
        std::fs::write(
            root.join("02").join("failures.log"),
            "DDD_010000002_0001_articletext.xml\nattempts: 1\n\n",
        )
        .unwrap();

        let report = import_failure_logs(&Config::for_root(root), &clock())
            .await
            .unwrap();

        assert_eq!(
            report,
            ImportReport {
                logs: 2,
                imported: 2,
                duplicates: 1,
                ignored: 1,
            }
        );
        assert_eq!(
            std::fs::read_to_string(root.join("missing.txt")).unwrap(),
            "DDD_010000001_0001_articletext.xml\n\
             DDD_010000001_0003_articletext.xml\n\
             DDD_010000002_0001_articletext.xml\n"
        );
        assert!(!root.join("01").join("failures.log").exists());
        assert!(
            root.join("01")
                .join("failures.log.20240131T120000Z.imported")
                .exists()
        );
    }

    #[tokio::test]
    async fn test_import_without_logs_leaves_queue_alone() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("01")).unwrap();

        let report = import_failure_logs(&Config::for_root(dir.path()), &clock())
            .await
            .unwrap();
        assert_eq!(report, ImportReport::default());
        assert!(!dir.path().join("missing.txt").exists());
    }
}
