//! On-disk naming conventions of the archive root
//!
//! ```text
//! <root>/
//!   manifests/  in_progress/  ocr_complete/      manifest lifecycle
//!   staging/                                     reorganizer scratch space
//!   missing.txt                                  retry queue
//!   01/                                          bundles whose id ends in "01"
//!     DDD:ddd:010000001:mpeg21.didl.xml.gz       metadata, until packaged
//!     DDD_010000001_0001_articletext.xml         fetched resources, until packaged
//!     DDD_ddd_010000001.tgz                      bundle archive
//!     DDD_ddd_010000001 -> <root>/1921/1921-03-04/DDD_ddd_010000001
//!     failures.log
//!   1921/1921-03-04/DDD_ddd_010000001/           reorganized bundle
//! ```

use crate::config::Config;
use crate::types::PaperId;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

// The patterns are literals; compiling them cannot fail.
#[allow(clippy::expect_used)]
static ARTICLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^DDD_(\d+)_([A-Za-z0-9]+)_[A-Za-z0-9]+\.xml$").expect("valid article pattern")
});

#[allow(clippy::expect_used)]
static ARCHIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^DDD_ddd_(\d+)\.tgz$").expect("valid archive pattern"));

#[allow(clippy::expect_used)]
static METADATA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^DDD:ddd:(\d+):mpeg21\.didl\.xml\.gz$").expect("valid metadata pattern")
});

/// Name of the gzipped metadata document of a bundle
pub fn metadata_name(id: &PaperId) -> String {
    format!("DDD:ddd:{}:mpeg21.didl.xml.gz", id)
}

/// Name of a bundle, which is also the name of its expanded directory and marker
pub fn bundle_name(id: &PaperId) -> String {
    format!("DDD_ddd_{}", id)
}

/// Name of the packaged archive of a bundle
pub fn archive_name(id: &PaperId) -> String {
    format!("{}.tgz", bundle_name(id))
}

/// Split an article resource filename into its bundle id and article serial
pub fn parse_article(filename: &str) -> Option<(PaperId, String)> {
    let caps = ARTICLE_RE.captures(filename)?;
    let id = PaperId::new(&caps[1])?;
    Some((id, caps[2].to_string()))
}

/// The bundle id of an archive filename
pub fn parse_archive_name(name: &str) -> Option<PaperId> {
    ARCHIVE_RE.captures(name).and_then(|caps| PaperId::new(&caps[1]))
}

/// The bundle id of a metadata document filename
pub fn parse_metadata_name(name: &str) -> Option<PaperId> {
    METADATA_RE.captures(name).and_then(|caps| PaperId::new(&caps[1]))
}

/// Whether `name` is a bundle subdirectory name (exactly two ASCII digits)
pub fn is_tail_dir_name(name: &str) -> bool {
    name.len() == 2 && name.bytes().all(|b| b.is_ascii_digit())
}

/// Resolved paths under one archive root
#[derive(Clone, Debug)]
pub struct Layout {
    root: PathBuf,
    todo_dir: String,
    progress_dir: String,
    finished_dir: String,
    staging_dir: String,
    error_log: String,
    queue_file: String,
}

impl Layout {
    /// Layout for the root and names of `config`
    pub fn new(config: &Config) -> Self {
        Self {
            root: config.root.clone(),
            todo_dir: config.layout.todo_dir.clone(),
            progress_dir: config.layout.progress_dir.clone(),
            finished_dir: config.layout.finished_dir.clone(),
            staging_dir: config.layout.staging_dir.clone(),
            error_log: config.layout.error_log.clone(),
            queue_file: config.queue.file_name.clone(),
        }
    }

    /// The archive root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Manifests waiting to be processed
    pub fn todo_dir(&self) -> PathBuf {
        self.root.join(&self.todo_dir)
    }

    /// Manifests being processed
    pub fn progress_dir(&self) -> PathBuf {
        self.root.join(&self.progress_dir)
    }

    /// Manifests fully processed
    pub fn finished_dir(&self) -> PathBuf {
        self.root.join(&self.finished_dir)
    }

    /// Scratch space for archive expansion
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(&self.staging_dir)
    }

    /// The retry queue file
    pub fn queue_file(&self) -> PathBuf {
        self.root.join(&self.queue_file)
    }

    /// Subdirectory holding the bundle's files, archive and marker
    pub fn tail_dir(&self, id: &PaperId) -> PathBuf {
        self.root.join(id.tail())
    }

    /// Error log of a bundle subdirectory
    pub fn error_log(&self, tail_dir: &Path) -> PathBuf {
        tail_dir.join(&self.error_log)
    }

    /// The idempotency marker left after reorganization
    pub fn marker_path(&self, id: &PaperId) -> PathBuf {
        self.tail_dir(id).join(bundle_name(id))
    }

    /// Final, date-keyed location of an expanded bundle
    pub fn dated_dir(&self, year: &str, date: &str, bundle: &str) -> PathBuf {
        self.root.join(year).join(date).join(bundle)
    }

    /// Resolve a manifest line to a metadata document path
    ///
    /// Relative lines are taken relative to the archive root.
    pub fn resolve_manifest_entry(&self, line: &str) -> PathBuf {
        let path = Path::new(line);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}
