//! Filesystem helpers: atomic writes, root access checks and free space

use crate::config::DiskSpaceConfig;
use crate::error::{Error, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Write `contents` to `path` so readers see either the old or the new file
///
/// The bytes go to a temporary file in the same directory, are flushed to disk
/// and then renamed over `path`.
pub fn atomic_write(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Remove a file, treating "already gone" as success
pub fn remove_file_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Metadata of `path` without following a final symlink, `None` if nothing is there
///
/// Any failure other than "not found" is returned.
pub async fn entry_metadata(path: &Path) -> std::io::Result<Option<std::fs::Metadata>> {
    match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) => Ok(Some(metadata)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Create a symlink at `link` pointing to the directory `target`
pub fn symlink_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link)
    }

    #[cfg(windows)]
    {
        std::os::windows::fs::symlink_dir(target, link)
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = (target, link);
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "symlinks are not supported on this platform",
        ))
    }
}

/// Canonicalise the archive root and make sure it is readable and writable
///
/// Every command refuses to start on a root it cannot both read and write.
pub fn ensure_root_accessible(root: &Path) -> Result<PathBuf> {
    let invalid = |reason: String| Error::InvalidRoot {
        path: root.to_path_buf(),
        reason,
    };

    let canonical = root.canonicalize().map_err(|e| invalid(e.to_string()))?;
    let metadata = std::fs::metadata(&canonical).map_err(|e| invalid(e.to_string()))?;
    if !metadata.is_dir() {
        return Err(invalid("not a directory".to_string()));
    }

    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(canonical.as_os_str().as_bytes())
            .map_err(|e| invalid(e.to_string()))?;
        // SAFETY: c_path is a valid, null-terminated C string and access(2) only reads it
        let rc = unsafe { libc::access(c_path.as_ptr(), libc::R_OK | libc::W_OK) };
        if rc != 0 {
            return Err(invalid(format!(
                "not readable and writable: {}",
                std::io::Error::last_os_error()
            )));
        }
    }

    #[cfg(not(unix))]
    {
        if metadata.permissions().readonly() {
            return Err(invalid("not writable".to_string()));
        }
        std::fs::read_dir(&canonical).map_err(|e| invalid(e.to_string()))?;
    }

    Ok(canonical)
}

/// Refuse to write `size_bytes` into `dir` if that would eat into the reserve
///
/// The requirement is `size_bytes * size_multiplier + min_free_space`.
pub fn check_disk_space(config: &DiskSpaceConfig, dir: &Path, size_bytes: u64) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    let required = (size_bytes as f64 * config.size_multiplier) as u64;
    let required_with_buffer = required.saturating_add(config.min_free_space);

    let available = get_available_space(dir).map_err(|e| {
        Error::DiskSpaceCheckFailed(format!(
            "Failed to check disk space for '{}': {}",
            dir.display(),
            e
        ))
    })?;

    if available < required_with_buffer {
        return Err(Error::InsufficientSpace {
            required: required_with_buffer,
            available,
        });
    }

    Ok(())
}

/// Get available disk space for a given path
///
/// Uses platform-specific APIs to query filesystem statistics:
/// - Linux: statvfs
/// - macOS: statvfs
/// - Windows: GetDiskFreeSpaceExW
///
/// # Returns
///
/// Returns the available disk space in bytes, or an IO error if the check fails.
pub fn get_available_space(path: &Path) -> std::io::Result<u64> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        // SAFETY: This is safe because:
        // 1. c_path is a valid, null-terminated C string created from the input path
        // 2. stat is properly initialized with zeroed memory before the call
        // 3. We check the return value and propagate any OS errors
        // 4. The statvfs struct is only read after a successful call
        unsafe {
            let mut stat: libc::statvfs = std::mem::zeroed();
            if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
                return Err(std::io::Error::last_os_error());
            }

            // f_bavail counts blocks available to unprivileged users
            #[allow(clippy::unnecessary_cast)]
            let available_bytes = (stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64);
            Ok(available_bytes)
        }
    }

    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::fileapi::GetDiskFreeSpaceExW;

        let wide_path: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        // SAFETY: wide_path is null-terminated and every output pointer refers to
        // a live, aligned u64 that is only read after a successful call
        unsafe {
            let mut free_bytes_available: u64 = 0;
            let mut _total_bytes: u64 = 0;
            let mut _total_free_bytes: u64 = 0;

            if GetDiskFreeSpaceExW(
                wide_path.as_ptr(),
                &mut free_bytes_available as *mut u64 as *mut _,
                &mut _total_bytes as *mut u64 as *mut _,
                &mut _total_free_bytes as *mut u64 as *mut _,
            ) == 0
            {
                return Err(std::io::Error::last_os_error());
            }

            Ok(free_bytes_available)
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = path;
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "Disk space checking is not supported on this platform",
        ))
    }
}
