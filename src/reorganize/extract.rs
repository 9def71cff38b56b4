//! Safe expansion of bundle archives
//!
//! Only regular files and directories are unpacked. An entry with an absolute
//! path, a `..` component, or any other type (links, devices) aborts the whole
//! expansion before anything is written for it.

use crate::error::ReorganizeError;
use flate2::read::GzDecoder;
use std::path::{Component, Path, PathBuf};
use tar::EntryType;

/// Expand the gzipped tar at `archive` into the existing directory `dest`
///
/// Returns the relative paths of the files written.
pub fn expand_archive(archive: &Path, dest: &Path) -> Result<Vec<PathBuf>, ReorganizeError> {
    let corrupt = |source: std::io::Error| ReorganizeError::CorruptArchive {
        archive: archive.to_path_buf(),
        source,
    };

    let file = std::fs::File::open(archive).map_err(corrupt)?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    let mut written = Vec::new();

    for entry in tar.entries().map_err(corrupt)? {
        let mut entry = entry.map_err(corrupt)?;
        let raw = entry.path().map_err(corrupt)?.into_owned();
        let relative = sanitize_entry_path(archive, &raw)?;

        let entry_type = entry.header().entry_type();
        if entry_type == EntryType::Directory {
            std::fs::create_dir_all(dest.join(&relative)).map_err(corrupt)?;
            continue;
        }
        if entry_type != EntryType::Regular && entry_type != EntryType::Continuous {
            return Err(ReorganizeError::UnsafeEntry {
                archive: archive.to_path_buf(),
                entry: raw,
                reason: "not a regular file or directory",
            });
        }

        let target = dest.join(&relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(corrupt)?;
        }
        entry.unpack(&target).map_err(corrupt)?;
        written.push(relative);
    }

    Ok(written)
}

/// Reduce an entry path to plain relative components
fn sanitize_entry_path(archive: &Path, raw: &Path) -> Result<PathBuf, ReorganizeError> {
    let unsafe_entry = |reason| ReorganizeError::UnsafeEntry {
        archive: archive.to_path_buf(),
        entry: raw.to_path_buf(),
        reason,
    };

    let mut clean = PathBuf::new();
    for component in raw.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir => return Err(unsafe_entry("parent directory component")),
            Component::RootDir | Component::Prefix(_) => {
                return Err(unsafe_entry("absolute path"));
            }
        }
    }

    if clean.as_os_str().is_empty() {
        return Err(unsafe_entry("empty path"));
    }
    Ok(clean)
}
