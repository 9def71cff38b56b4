//! Core types for ocr-harvest

use crate::error::FetchError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identifier of one newspaper issue (the numeric serial in its OAI identifier)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaperId(String);

impl PaperId {
    /// Wrap a serial, rejecting anything that is not a non-empty digit string
    pub fn new(serial: impl Into<String>) -> Option<Self> {
        let serial = serial.into();
        if !serial.is_empty() && serial.bytes().all(|b| b.is_ascii_digit()) {
            Some(Self(serial))
        } else {
            None
        }
    }

    /// The serial as text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The trailing two digits, used to spread bundles over subdirectories
    pub fn tail(&self) -> &str {
        let start = self.0.len().saturating_sub(2);
        &self.0[start..]
    }
}

impl std::fmt::Display for PaperId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Digest algorithm declared for a resource
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    /// MD5, 32 hex digits
    Md5,
    /// SHA-512, 128 hex digits
    Sha512,
}

impl ChecksumAlgorithm {
    /// Guess the algorithm from the length of a hex digest
    ///
    /// Queue files store checksums without naming the algorithm, so the digest
    /// length is the only hint available.
    pub fn from_hex_len(len: usize) -> Option<Self> {
        match len {
            32 => Some(Self::Md5),
            128 => Some(Self::Sha512),
            _ => None,
        }
    }

    /// Lowercase hex digest of `bytes`
    pub fn digest_hex(self, bytes: &[u8]) -> String {
        match self {
            Self::Md5 => format!("{:x}", md5::compute(bytes)),
            Self::Sha512 => {
                use sha2::{Digest, Sha512};
                format!("{:x}", Sha512::digest(bytes))
            }
        }
    }
}

impl std::fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Md5 => f.write_str("md5"),
            Self::Sha512 => f.write_str("sha512"),
        }
    }
}

/// An expected digest together with its algorithm
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum {
    /// Digest algorithm
    pub algorithm: ChecksumAlgorithm,
    /// Lowercase hex digest
    pub hex: String,
}

impl Checksum {
    /// Create a checksum, normalising the hex text to lowercase
    pub fn new(algorithm: ChecksumAlgorithm, hex: &str) -> Self {
        Self {
            algorithm,
            hex: hex.trim().to_ascii_lowercase(),
        }
    }

    /// Build a checksum from bare hex text, inferring the algorithm
    pub fn infer(hex: &str) -> Result<Self, FetchError> {
        let hex = hex.trim();
        let algorithm = ChecksumAlgorithm::from_hex_len(hex.len())
            .filter(|_| hex.bytes().all(|b| b.is_ascii_hexdigit()))
            .ok_or_else(|| FetchError::UnknownChecksum {
                checksum: hex.to_string(),
            })?;
        Ok(Self::new(algorithm, hex))
    }

    /// Compute the digest of `bytes` with this checksum's algorithm
    pub fn actual(&self, bytes: &[u8]) -> String {
        self.algorithm.digest_hex(bytes)
    }

    /// Whether `bytes` hash to this checksum
    pub fn matches(&self, bytes: &[u8]) -> bool {
        self.actual(bytes) == self.hex
    }
}

/// Checksum and URL of a resource, as recorded in its bundle metadata
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSource {
    /// Checksum text exactly as recorded
    pub checksum: String,
    /// Source URL
    pub url: String,
}

/// One entry of the retry queue
///
/// An item starts out as a bare filename; once its bundle metadata has been
/// consulted it also carries the checksum and URL, and is never re-resolved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Resource filename, e.g. `DDD_010000001_0004_articletext.xml`
    pub filename: String,
    /// Checksum and URL, once discovered
    pub resolved: Option<ResolvedSource>,
}

impl WorkItem {
    /// An item known only by filename
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            resolved: None,
        }
    }

    /// An item with checksum and URL already known
    pub fn resolved(
        filename: impl Into<String>,
        checksum: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            resolved: Some(ResolvedSource {
                checksum: checksum.into(),
                url: url.into(),
            }),
        }
    }

    /// Whether checksum and URL are known
    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }
}

impl std::fmt::Display for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.resolved {
            Some(source) => write!(f, "{} {} {}", self.filename, source.checksum, source.url),
            None => f.write_str(&self.filename),
        }
    }
}

/// A line of the retry queue file
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueueEntry {
    /// A well-formed work item
    Item(WorkItem),
    /// A line that could not be understood, kept verbatim for manual inspection
    Unparsed(String),
}

impl QueueEntry {
    /// Parse one non-empty queue line (`<filename> [<checksum> <url>]`)
    pub fn parse(line: &str) -> Self {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [filename] => Self::Item(WorkItem::new(*filename)),
            [filename, checksum, url] => Self::Item(WorkItem::resolved(*filename, *checksum, *url)),
            _ => Self::Unparsed(line.trim().to_string()),
        }
    }

    /// Render the entry as a queue line, without the trailing newline
    pub fn to_line(&self) -> String {
        match self {
            Self::Item(item) => item.to_string(),
            Self::Unparsed(line) => line.clone(),
        }
    }

    /// The resource filename, if this is a well-formed item
    pub fn filename(&self) -> Option<&str> {
        match self {
            Self::Item(item) => Some(&item.filename),
            Self::Unparsed(_) => None,
        }
    }
}

impl From<WorkItem> for QueueEntry {
    fn from(item: WorkItem) -> Self {
        Self::Item(item)
    }
}

/// A resource successfully placed on disk
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedResource {
    /// Where the resource now lives
    pub path: PathBuf,
    /// Resource filename (its name inside bundle archives)
    pub name: String,
    /// The verified checksum, if one was declared
    pub checksum: Option<Checksum>,
    /// Source URL
    pub url: String,
    /// True when an already-present, verified file was kept instead of fetching
    pub reused: bool,
}

/// Result of working on one retry-queue item
#[derive(Debug)]
pub enum ItemOutcome {
    /// The resource is on disk; the item leaves the queue
    Fetched,
    /// The bundle is not available yet; the item was not attempted
    Deferred,
    /// The attempt failed; the item stays queued
    Failed(FetchError),
}

/// Result of processing one bundle listed in a manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleOutcome {
    /// A fresh archive was written
    Packaged {
        /// The archive path
        archive: PathBuf,
        /// Resources included in the archive
        fetched: usize,
        /// Resources recorded in the error log instead
        failed: usize,
    },
    /// The archive already exists and the sources are gone
    AlreadyPackaged {
        /// The archive path
        archive: PathBuf,
    },
    /// The bundle could not be processed; its sources are untouched
    Failed {
        /// What went wrong
        reason: String,
    },
}

/// Result of reorganizing one bundle archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReorganizeOutcome {
    /// The bundle was expanded, filed by date and marked
    Reorganized {
        /// Final location of the expanded bundle
        destination: PathBuf,
    },
    /// The marker symlink already exists
    AlreadyDone,
    /// The bundle was abandoned in place
    Failed {
        /// What went wrong
        reason: String,
    },
}

/// Counters for one pass over the retry queue
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Items whose resource is now on disk
    pub fetched: usize,
    /// Items skipped because their bundle is not available yet
    pub deferred: usize,
    /// Items whose attempt failed
    pub failed: usize,
    /// Lines kept verbatim because they could not be parsed
    pub unparsed: usize,
}

impl PassReport {
    /// Items that remain queued after this pass
    pub fn remaining(&self) -> usize {
        self.deferred + self.failed + self.unparsed
    }
}

/// Summary of a retry queue run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct QueueReport {
    /// Completed passes
    pub passes: usize,
    /// Resources fetched over all passes
    pub fetched: usize,
    /// Entries still queued when the run ended
    pub remaining: usize,
}

/// Summary of a failure-log import
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Error logs consumed
    pub logs: usize,
    /// Filenames appended to the queue
    pub imported: usize,
    /// Filenames skipped because they were already queued
    pub duplicates: usize,
    /// Entry headers that are not resource filenames
    pub ignored: usize,
}

/// Counters for one processed manifest
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ManifestReport {
    /// Bundles packaged into a fresh archive
    pub bundles_packaged: usize,
    /// Bundles found already packaged
    pub bundles_skipped: usize,
    /// Bundles that could not be processed
    pub bundles_failed: usize,
    /// Resources included in archives
    pub resources_fetched: usize,
    /// Resources recorded in error logs
    pub resources_failed: usize,
}

impl ManifestReport {
    /// Fold one bundle outcome into the counters
    pub fn record(&mut self, outcome: &BundleOutcome) {
        match outcome {
            BundleOutcome::Packaged {
                fetched, failed, ..
            } => {
                self.bundles_packaged += 1;
                self.resources_fetched += fetched;
                self.resources_failed += failed;
            }
            BundleOutcome::AlreadyPackaged { .. } => self.bundles_skipped += 1,
            BundleOutcome::Failed { .. } => self.bundles_failed += 1,
        }
    }

    /// Add another report's counters to this one
    pub fn merge(&mut self, other: &ManifestReport) {
        self.bundles_packaged += other.bundles_packaged;
        self.bundles_skipped += other.bundles_skipped;
        self.bundles_failed += other.bundles_failed;
        self.resources_fetched += other.resources_fetched;
        self.resources_failed += other.resources_failed;
    }
}

/// Summary of a manifest processor run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct HarvestReport {
    /// Manifests moved to the finished directory
    pub manifests: usize,
    /// Bundle and resource counters over all manifests
    pub totals: ManifestReport,
}

/// Counters for one reorganizer scan
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReorganizeReport {
    /// Bundles filed by date during this scan
    pub reorganized: usize,
    /// Bundles whose marker already existed
    pub already_done: usize,
    /// Bundles abandoned in place
    pub failed: usize,
}

impl ReorganizeReport {
    /// Fold one bundle outcome into the counters
    pub fn record(&mut self, outcome: &ReorganizeOutcome) {
        match outcome {
            ReorganizeOutcome::Reorganized { .. } => self.reorganized += 1,
            ReorganizeOutcome::AlreadyDone => self.already_done += 1,
            ReorganizeOutcome::Failed { .. } => self.failed += 1,
        }
    }
}
