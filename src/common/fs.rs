//! Filesystem utility functions
//!
//! This module provides utility functions for filesystem operations and
//! locating external executables.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use super::error::{AppError, Result};

/// Alternate install directories searched for the web proxy executable.
///
/// These are prepended to `PATH` at startup so that distributions which
/// install the proxy outside the default search path are still found.
const ALTERNATE_PROXY_PATHS: &[&str] = &[
    "/usr/local/nginx/sbin",
    "/opt/nginx/sbin",
    "/usr/sbin",
    "/sbin",
];

/// Ensure a path names a regular file
///
/// Used to reject missing paths and directories up front, so callers report
/// a clear configuration error instead of a bare read failure.
pub fn check_file_exists(path: &Path) -> Result<()> {
    let meta = fs::metadata(path)
        .map_err(|e| AppError::Config(format!("cannot access {}: {}", path.display(), e)))?;
    if !meta.is_file() {
        return Err(AppError::Config(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    Ok(())
}

/// Write a file atomically
///
/// Writes `contents` to a sibling temporary file and renames it over `path`.
/// The rename is atomic on POSIX filesystems, so readers never observe a
/// partially written file.
///
/// # Arguments
///
/// * `path` - Destination path
/// * `contents` - Bytes to write
pub fn atomic_write(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, contents)?;
    match fs::rename(&tmp, path) {
        Ok(()) => Ok(()),
        Err(e) => {
            // Leave no stray temporary file behind on failure
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

/// Find an executable command on the current `PATH`
///
/// # Arguments
///
/// * `cmd` - Command name, e.g. `"nginx"`
///
/// # Returns
///
/// Returns the full path to the command, or `None` if it is not installed.
pub fn find_executable_on_path(cmd: &str) -> Option<PathBuf> {
    let path_var = env::var_os("PATH")?;
    for dir in env::split_paths(&path_var) {
        let candidate = dir.join(cmd);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

/// Prepend the alternate proxy install directories to `PATH`
///
/// Directories already present in `PATH` are not duplicated. Call once at
/// startup, before the first backend presence check.
pub fn prepend_alternate_paths() {
    let current = env::var_os("PATH").unwrap_or_default();
    let existing: Vec<PathBuf> = env::split_paths(&current).collect();

    let mut paths: Vec<PathBuf> = ALTERNATE_PROXY_PATHS
        .iter()
        .map(PathBuf::from)
        .filter(|p| !existing.contains(p))
        .collect();
    if paths.is_empty() {
        return;
    }
    paths.extend(existing);

    if let Ok(joined) = env::join_paths(paths) {
        env::set_var("PATH", joined);
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.is_file()
        && fs::metadata(path)
            .map(|m| m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
