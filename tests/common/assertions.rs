//! Inspection helpers for archives, queues and directories

use flate2::read::GzDecoder;
use std::collections::BTreeMap;
use std::path::Path;

/// Entry names and contents of a bundle archive
pub fn archive_contents(archive: &Path) -> BTreeMap<String, Vec<u8>> {
    use std::io::Read;

    let file = std::fs::File::open(archive).expect("open archive");
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    let mut contents = BTreeMap::new();
    for entry in tar.entries().expect("read entries") {
        let mut entry = entry.expect("read entry");
        let name = entry
            .path()
            .expect("entry path")
            .to_string_lossy()
            .into_owned();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).expect("read entry data");
        contents.insert(name, data);
    }
    contents
}

/// Non-empty lines of the queue file, or nothing if it does not exist
pub fn queue_lines(path: &Path) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => panic!("could not read queue {}: {}", path.display(), e),
    }
}

/// Sorted file names in `dir`
pub fn dir_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("read dir")
        .map(|e| e.expect("dir entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Every path under `dir`, relative to it, symlinks not followed
pub fn tree(dir: &Path) -> Vec<String> {
    let mut paths: Vec<String> = walkdir::WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .map(|e| {
            let entry = e.expect("walk entry");
            entry
                .path()
                .strip_prefix(dir)
                .expect("under dir")
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    paths.sort();
    paths
}
