//! Bundle archives (gzip-compressed tar)

use crate::error::{Error, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::path::{Path, PathBuf};

/// A file to put in an archive, with its name inside the archive
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    /// Where the file is now
    pub path: PathBuf,
    /// Entry name in the archive
    pub name: String,
}

/// Write `members` into a new archive at `archive`
///
/// The archive is assembled in a temporary file next to its final location and
/// renamed into place once complete and synced, so `archive` either does not
/// exist or is whole.
pub async fn write_archive(archive: &Path, members: Vec<Member>) -> Result<()> {
    let target = archive.to_path_buf();
    tokio::task::spawn_blocking(move || build_archive(&target, &members))
        .await
        .map_err(|e| Error::TaskFailed(format!("archive task failed: {}", e)))??;
    Ok(())
}

/// Total size in bytes of the files in `members`
pub async fn total_size(members: &[Member]) -> Result<u64> {
    let mut total = 0u64;
    for member in members {
        total = total.saturating_add(tokio::fs::metadata(&member.path).await?.len());
    }
    Ok(total)
}

fn build_archive(archive: &Path, members: &[Member]) -> std::io::Result<()> {
    let dir = archive
        .parent()
        .ok_or_else(|| std::io::Error::other("archive path has no parent directory"))?;
    let tmp = tempfile::NamedTempFile::new_in(dir)?;

    let mut builder = tar::Builder::new(GzEncoder::new(tmp, Compression::default()));
    for member in members {
        builder.append_path_with_name(&member.path, &member.name)?;
    }
    let tmp = builder.into_inner()?.finish()?;

    tmp.as_file().sync_all()?;
    tmp.persist(archive).map_err(|e| e.error)?;
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use tempfile::TempDir;

    fn entry_names(archive: &Path) -> Vec<String> {
        let file = std::fs::File::open(archive).unwrap();
        let mut tar = tar::Archive::new(GzDecoder::new(file));
        tar.entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[tokio::test]
    async fn test_write_archive_with_names() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.xml");
        let b = dir.path().join("b.xml");
        std::fs::write(&a, "aaa").unwrap();
        std::fs::write(&b, "bb").unwrap();
        let members = vec![
            Member {
                path: a.clone(),
                name: "first.xml".to_string(),
            },
            Member {
                path: b,
                name: "second.xml".to_string(),
            },
        ];

        assert_eq!(total_size(&members).await.unwrap(), 5);

        let archive = dir.path().join("DDD_ddd_1.tgz");
        write_archive(&archive, members).await.unwrap();

        assert_eq!(entry_names(&archive), vec!["first.xml", "second.xml"]);
        // sources are untouched; only the archive and the two inputs exist
        assert!(a.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 3);
    }

    #[tokio::test]
    async fn test_missing_member_leaves_no_archive() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("DDD_ddd_1.tgz");
        let members = vec![Member {
            path: dir.path().join("absent.xml"),
            name: "absent.xml".to_string(),
        }];

        assert!(write_archive(&archive, members).await.is_err());
        assert!(!archive.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
