//! Checksum-verified resource fetching
//!
//! [`ResourceFetcher::fetch`] performs exactly one HTTP request. The body is
//! hashed before anything touches the target path, and the file only appears
//! through a rename of a fully written temporary file, so a failure never
//! leaves a partial or unverified file behind. Retrying is the caller's job.

use crate::config::FetchConfig;
use crate::error::{FetchError, Result};
use crate::metadata::ResourceEntry;
use crate::types::{Checksum, FetchedResource};
use crate::utils::remove_file_if_exists;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Filename, checksum and URL extracted from a metadata resource node
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceSource {
    /// Resource filename
    pub filename: String,
    /// Declared checksum
    pub checksum: Checksum,
    /// Source URL
    pub url: String,
}

impl ResourceSource {
    /// Extract everything needed to fetch a resource from its metadata entry
    ///
    /// The checksum is taken from the MD5 attribute when present and from the
    /// SHA-512 attribute otherwise. A resource with neither cannot be verified
    /// and is rejected.
    pub fn from_entry(entry: &ResourceEntry) -> std::result::Result<Self, FetchError> {
        let filename = entry
            .filename
            .clone()
            .ok_or_else(|| FetchError::MissingAttribute {
                filename: "undetermined".to_string(),
                attribute: "filename",
            })?;
        let checksum = entry.checksum().ok_or_else(|| FetchError::MissingAttribute {
            filename: filename.clone(),
            attribute: "checksum",
        })?;
        let url = entry.url.clone().ok_or_else(|| FetchError::MissingAttribute {
            filename: filename.clone(),
            attribute: "ref",
        })?;
        Ok(Self {
            filename,
            checksum,
            url,
        })
    }
}

/// Fetches single resources over HTTP
#[derive(Clone, Debug)]
pub struct ResourceFetcher {
    client: reqwest::Client,
}

impl ResourceFetcher {
    /// Build a fetcher with the configured timeout and user agent
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }

    /// Fetch `url` once and place the verified bytes at `target`
    ///
    /// If `target` already holds bytes matching `checksum` no request is made.
    /// Any other file at `target` is removed first, and always when there is no
    /// checksum to check it against, so on failure nothing is left at `target`.
    pub async fn fetch(
        &self,
        target: &Path,
        checksum: Option<&Checksum>,
        url: &str,
    ) -> std::result::Result<FetchedResource, FetchError> {
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match checksum {
            Some(checksum) => {
                if self.verify_existing(target, checksum).await? {
                    debug!(path = ?target, "reusing verified resource");
                    return Ok(FetchedResource {
                        path: target.to_path_buf(),
                        name,
                        checksum: Some(checksum.clone()),
                        url: url.to_string(),
                        reused: true,
                    });
                }
            }
            None => remove_file_if_exists(target).map_err(|source| FetchError::Write {
                path: target.to_path_buf(),
                source,
            })?,
        }

        url::Url::parse(url).map_err(|source| FetchError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;

        debug!(url, path = ?target, "fetching resource");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })?;

        if let Some(checksum) = checksum {
            let actual = checksum.actual(&body);
            if actual != checksum.hex {
                return Err(FetchError::ChecksumMismatch {
                    url: url.to_string(),
                    algorithm: checksum.algorithm,
                    expected: checksum.hex.clone(),
                    actual,
                });
            }
        }

        write_verified(target.to_path_buf(), body.to_vec()).await?;
        debug!(path = ?target, bytes = body.len(), "resource written");

        Ok(FetchedResource {
            path: target.to_path_buf(),
            name,
            checksum: checksum.cloned(),
            url: url.to_string(),
            reused: false,
        })
    }

    /// Discover a resource from its metadata entry and fetch it into `dir`
    pub async fn fetch_entry(
        &self,
        entry: &ResourceEntry,
        dir: &Path,
    ) -> std::result::Result<FetchedResource, FetchError> {
        let source = ResourceSource::from_entry(entry)?;
        let target = dir.join(&source.filename);
        self.fetch(&target, Some(&source.checksum), &source.url)
            .await
    }

    /// Whether `target` already holds the expected bytes; removes it if it does not
    async fn verify_existing(
        &self,
        target: &Path,
        checksum: &Checksum,
    ) -> std::result::Result<bool, FetchError> {
        let bytes = match tokio::fs::read(target).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(source) => {
                return Err(FetchError::Write {
                    path: target.to_path_buf(),
                    source,
                });
            }
        };

        if checksum.matches(&bytes) {
            return Ok(true);
        }

        warn!(path = ?target, "removing resource that does not match its checksum");
        tokio::fs::remove_file(target)
            .await
            .map_err(|source| FetchError::Write {
                path: target.to_path_buf(),
                source,
            })?;
        Ok(false)
    }
}

/// Write through a synced temporary file in the target directory, then rename
async fn write_verified(target: PathBuf, bytes: Vec<u8>) -> std::result::Result<(), FetchError> {
    let path = target.clone();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let dir = target
            .parent()
            .ok_or_else(|| std::io::Error::other("target has no parent directory"))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| std::io::Error::other(format!("write task failed: {}", e)))
    .and_then(|r| r)
    .map_err(|source| FetchError::Write { path, source })
}
