//! Per-bundle error logs
//!
//! A resource that still fails after all attempts is recorded in the error log
//! of its bundle subdirectory. Each entry is a block of lines ended by a blank
//! line:
//!
//! ```text
//! DDD_010000001_0002_articletext.xml
//! attempts: 5
//! kind: http
//! at: 2024-01-31T23:59:59+00:00
//! request to http://example.com/a2 failed
//! caused by: ...
//!
//! ```
//!
//! The first line of every block is the resource filename, which is all the
//! failure-log import needs to rebuild queue items.

use crate::error::FetchError;
use chrono::{DateTime, Utc};
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Render one error log entry, including the error's source chain
pub fn format_entry(filename: &str, attempts: u32, at: DateTime<Utc>, error: &FetchError) -> String {
    let mut entry = format!(
        "{}\nattempts: {}\nkind: {}\nat: {}\n{}\n",
        filename,
        attempts,
        error.kind(),
        at.to_rfc3339(),
        error
    );
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        entry.push_str(&format!("caused by: {}\n", cause));
        source = cause.source();
    }
    entry.push('\n');
    entry
}

/// Append an entry to the error log at `path`, creating the log if needed
pub async fn append_entry(path: &Path, entry: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(entry.as_bytes()).await?;
    file.sync_data().await
}

/// The first line of every entry, in order of appearance
pub fn entry_headers(contents: &str) -> Vec<String> {
    let mut headers = Vec::new();
    let mut at_block_start = true;
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            at_block_start = true;
        } else if at_block_start {
            headers.push(line.to_string());
            at_block_start = false;
        }
    }
    headers
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MetadataError;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap()
    }

    #[test]
    fn test_format_entry_includes_cause_chain() {
        let err = FetchError::Write {
            path: "/archive/a.xml".into(),
            source: std::io::Error::other("disk full"),
        };
        let entry = format_entry("a.xml", 5, at(), &err);
        assert_eq!(
            entry,
            "a.xml\nattempts: 5\nkind: write\nat: 2024-01-31T23:59:59+00:00\n\
             failed to write /archive/a.xml\n\
             caused by: disk full\n\n"
        );
    }

    #[test]
    fn test_format_entry_records_kind_of_wrapped_error() {
        let err: FetchError = MetadataError::MissingDate.into();
        let entry = format_entry("b.xml", 1, at(), &err);
        assert_eq!(
            entry,
            "b.xml\nattempts: 1\nkind: metadata\nat: 2024-01-31T23:59:59+00:00\n\
             no publication date in metadata\n\n"
        );
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("failures.log");
        let status = FetchError::Status {
            url: "http://example.com/a".to_string(),
            status: 500,
        };

        append_entry(&log, &format_entry("a.xml", 5, at(), &status))
            .await
            .unwrap();
        append_entry(&log, &format_entry("b.xml", 1, at(), &status))
            .await
            .unwrap();

        let contents = std::fs::read_to_string(&log).unwrap();
        assert_eq!(entry_headers(&contents), vec!["a.xml", "b.xml"]);
    }

    #[test]
    fn test_headers_of_traceback_style_entries() {
        let contents = "a.xml\nTraceback (most recent call last):\n  File \"x\"\nValueError\n\n\nb.xml\nboom\n\n";
        assert_eq!(entry_headers(contents), vec!["a.xml", "b.xml"]);
        assert!(entry_headers("").is_empty());
    }
}
