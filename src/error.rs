//! Error types for ocr-harvest
//!
//! This module provides the error taxonomy shared by every pipeline component:
//! - Fetch errors (transport, HTTP status, checksum mismatch, unresolvable resource)
//! - Metadata errors (unreadable or malformed bundle metadata documents)
//! - Reorganization errors (unsafe archive entries, missing metadata, conflicts)
//! - Fatal errors (unusable archive root, queue persistence, disk space)
//!
//! Per-item failures are reported as outcome values by the components; only the
//! variants of [`Error`] that make a whole run unusable propagate to the caller.

use crate::types::ChecksumAlgorithm;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ocr-harvest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for ocr-harvest
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "retry.max_attempts")
        key: Option<String>,
    },

    /// The archive root is missing or not readable and writable
    #[error("archive root {path} is unusable: {reason}")]
    InvalidRoot {
        /// The configured archive root
        path: PathBuf,
        /// Why the root was rejected
        reason: String,
    },

    /// Resource fetch failed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The HTTP client could not be built
    #[error("HTTP client error")]
    HttpClient(#[from] reqwest::Error),

    /// Bundle metadata could not be read or understood
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// Date reorganization failed for a bundle
    #[error(transparent)]
    Reorganize(#[from] ReorganizeError),

    /// The retry queue file could not be written
    #[error("failed to persist retry queue {path}")]
    QueuePersist {
        /// The queue file path
        path: PathBuf,
        /// The underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// A manifest could not be moved between lifecycle directories
    #[error("failed to move manifest {from} to {to}")]
    StageTransition {
        /// Where the manifest was
        from: PathBuf,
        /// Where it should have gone
        to: PathBuf,
        /// The underlying rename failure
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Insufficient disk space
    #[error("insufficient disk space: need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        /// Number of bytes required for the operation
        required: u64,
        /// Number of bytes currently available on disk
        available: u64,
    },

    /// Failed to check disk space
    #[error("failed to check disk space: {0}")]
    DiskSpaceCheckFailed(String),

    /// A blocking worker task panicked or was cancelled
    #[error("background task failed: {0}")]
    TaskFailed(String),
}

/// Render an error followed by every error in its `source()` chain
///
/// Messages never repeat their own cause, so this is the form to use wherever
/// an error is shown to a person.
pub fn display_chain(error: &dyn std::error::Error) -> String {
    let mut text = error.to_string();
    let mut cause = error.source();
    while let Some(inner) = cause {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        cause = inner.source();
    }
    text
}

/// Errors raised while fetching a single resource
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (connect, timeout, body read)
    #[error("request to {url} failed")]
    Http {
        /// The requested URL
        url: String,
        /// The underlying client error
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status
    #[error("{url} returned HTTP {status}")]
    Status {
        /// The requested URL
        url: String,
        /// The HTTP status code
        status: u16,
    },

    /// The retrieved bytes do not match the declared checksum
    #[error("{algorithm} checksum mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The requested URL
        url: String,
        /// The digest algorithm used
        algorithm: ChecksumAlgorithm,
        /// The checksum declared in metadata
        expected: String,
        /// The checksum of the retrieved bytes
        actual: String,
    },

    /// No resource with this filename exists in the bundle metadata
    #[error("resource {filename} not found in metadata")]
    ResourceNotFound {
        /// The resource filename that was looked up
        filename: String,
    },

    /// The resource node lacks a required attribute
    #[error("resource {filename} has no {attribute} attribute")]
    MissingAttribute {
        /// The resource filename
        filename: String,
        /// The missing attribute (e.g. "ref", "checksum")
        attribute: &'static str,
    },

    /// The source URL cannot be parsed
    #[error("invalid URL {url:?}")]
    InvalidUrl {
        /// The offending URL text
        url: String,
        /// The parse failure
        #[source]
        source: url::ParseError,
    },

    /// The checksum text does not correspond to a known digest algorithm
    #[error("checksum {checksum:?} matches no supported algorithm")]
    UnknownChecksum {
        /// The unrecognised checksum text
        checksum: String,
    },

    /// The bundle metadata needed for discovery could not be read
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// The directory a queued resource belongs in cannot be resolved
    #[error("bundle directory {path} is unavailable")]
    BundleUnavailable {
        /// The marker or directory that was looked up
        path: PathBuf,
        /// The underlying lookup failure
        #[source]
        source: std::io::Error,
    },

    /// The verified bytes could not be placed at the target path
    #[error("failed to write {path}")]
    Write {
        /// The target path
        path: PathBuf,
        /// The underlying I/O failure
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Short machine-readable classification, used in error logs
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Http { .. } => "http",
            FetchError::Status { .. } => "status",
            FetchError::ChecksumMismatch { .. } => "checksum_mismatch",
            FetchError::ResourceNotFound { .. } => "resource_not_found",
            FetchError::MissingAttribute { .. } => "missing_attribute",
            FetchError::InvalidUrl { .. } => "invalid_url",
            FetchError::UnknownChecksum { .. } => "unknown_checksum",
            FetchError::Metadata(_) => "metadata",
            FetchError::BundleUnavailable { .. } => "bundle_unavailable",
            FetchError::Write { .. } => "write",
        }
    }
}

/// Errors raised while reading a bundle metadata document
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The document could not be opened or decompressed
    #[error("failed to read {path}")]
    Read {
        /// The metadata document path
        path: PathBuf,
        /// The underlying I/O or gzip failure
        #[source]
        source: std::io::Error,
    },

    /// The XML is malformed
    #[error("malformed XML")]
    Xml(#[from] quick_xml::Error),

    /// The document carries no publication date
    #[error("no publication date in metadata")]
    MissingDate,

    /// The publication date does not look like YYYY-MM-DD
    #[error("unrecognised publication date {0:?}")]
    MalformedDate(String),
}

/// Errors raised while reorganizing a bundle archive by date
#[derive(Debug, Error)]
pub enum ReorganizeError {
    /// An archive entry would be written outside the staging directory
    #[error("unsafe entry {entry} in {archive}: {reason}")]
    UnsafeEntry {
        /// The archive being expanded
        archive: PathBuf,
        /// The entry path as stored in the archive
        entry: PathBuf,
        /// Why the entry was rejected
        reason: &'static str,
    },

    /// The archive could not be read
    #[error("corrupt archive {archive}")]
    CorruptArchive {
        /// The archive being expanded
        archive: PathBuf,
        /// The underlying read failure
        #[source]
        source: std::io::Error,
    },

    /// The expanded archive does not contain the bundle metadata document
    #[error("archive {archive} does not contain {expected}")]
    MissingMetadata {
        /// The archive that was expanded
        archive: PathBuf,
        /// The metadata document that should have been in it
        expected: String,
    },

    /// Something other than a directory occupies the final location
    #[error("destination {path} exists and is not a directory")]
    DestinationConflict {
        /// The final bundle location
        path: PathBuf,
    },
}
