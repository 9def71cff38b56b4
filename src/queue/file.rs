//! The retry queue file: one item per line, `<filename> [<checksum> <url>]`

use crate::error::{Error, Result};
use crate::types::QueueEntry;
use crate::utils::atomic_write;
use std::path::{Path, PathBuf};

/// Handle on the queue file of an archive root
#[derive(Clone, Debug)]
pub struct QueueFile {
    path: PathBuf,
}

impl QueueFile {
    /// Queue file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the queue file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every entry; a missing file is an empty queue
    pub fn load(&self) -> Result<Vec<QueueEntry>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Io(e)),
        };
        Ok(parse(&contents))
    }

    /// Replace the file with `entries`, atomically
    pub fn persist<'a>(&self, entries: impl IntoIterator<Item = &'a QueueEntry>) -> Result<()> {
        let contents = render(entries);
        atomic_write(&self.path, contents.as_bytes()).map_err(|source| Error::QueuePersist {
            path: self.path.clone(),
            source,
        })
    }
}

/// Parse queue file contents, skipping blank lines
pub fn parse(contents: &str) -> Vec<QueueEntry> {
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(QueueEntry::parse)
        .collect()
}

/// Render entries as queue file contents
pub fn render<'a>(entries: impl IntoIterator<Item = &'a QueueEntry>) -> String {
    let mut contents = String::new();
    for entry in entries {
        contents.push_str(&entry.to_line());
        contents.push('\n');
    }
    contents
}
