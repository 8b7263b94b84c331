//! Cache purge engine
//!
//! The web proxy caches responses on disk under keys of the form
//! `<provisioningSessionId>:u=<urlPath>`. Each cache file carries its key in
//! a text header within the first 4 KiB, on a line reading `KEY: <key>`.
//! Purging walks the cache directory, parses each file's key, deletes the
//! entries matching a predicate and signals the proxy so it drops in-memory
//! references.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use regex::Regex;

use crate::common::Result;

/// Header prefix introducing the cache key
const KEY_MARKER: &[u8] = b"KEY: ";

/// How much of each cache file is inspected for the key header
const HEADER_PREFIX_LEN: usize = 4096;

/// Predicate selecting which cache entries of a provisioning session to purge
#[derive(Debug, Clone)]
pub enum CachePredicate {
    /// Every entry of the session
    All,
    /// Entries whose URL path equals the given path
    Path(String),
    /// Entries whose URL path starts with the given prefix
    Prefix(String),
    /// Entries whose URL path matches the given pattern
    Pattern(Regex),
}

impl CachePredicate {
    /// Build a regex predicate, compiling the user-supplied pattern
    ///
    /// # Returns
    ///
    /// Returns the compile error message when the pattern is not a valid
    /// regular expression.
    pub fn pattern(pattern: &str) -> std::result::Result<Self, String> {
        Regex::new(pattern)
            .map(CachePredicate::Pattern)
            .map_err(|e| e.to_string())
    }

    fn matches(&self, url_path: &str) -> bool {
        match self {
            CachePredicate::All => true,
            CachePredicate::Path(path) => url_path == path,
            CachePredicate::Prefix(prefix) => url_path.starts_with(prefix),
            CachePredicate::Pattern(re) => re.is_match(url_path),
        }
    }
}

/// Parse a cache key out of a file-header prefix
///
/// The key is introduced by `KEY: ` at the start of the buffer or after a
/// newline, runs to the next newline and has the form `<psid>:u=<urlPath>`.
///
/// # Returns
///
/// Returns the `(provisioning session id, url path)` pair, or `None` when
/// the buffer carries no parseable key.
pub fn parse_cache_key(header: &[u8]) -> Option<(String, String)> {
    let start = if header.starts_with(KEY_MARKER) {
        KEY_MARKER.len()
    } else {
        let mut marker = Vec::with_capacity(KEY_MARKER.len() + 1);
        marker.push(b'\n');
        marker.extend_from_slice(KEY_MARKER);
        let pos = header
            .windows(marker.len())
            .position(|w| w == marker.as_slice())?;
        pos + marker.len()
    };

    let rest = &header[start..];
    let end = rest.iter().position(|&b| b == b'\n')?;
    let key = std::str::from_utf8(&rest[..end]).ok()?;

    let (psid, url_path) = key.split_once(":u=")?;
    Some((psid.to_string(), url_path.to_string()))
}

/// Purge cache entries of a provisioning session matching a predicate
///
/// Walks the cache directory, deletes every file whose parsed key belongs to
/// `psid` and matches `predicate`, and returns the number of files deleted.
/// Files that vanish concurrently (the proxy also writes this directory) are
/// tolerated; files without a parseable key are skipped.
pub fn purge_cache(cache_dir: &Path, psid: &str, predicate: &CachePredicate) -> Result<usize> {
    let mut deleted = 0;

    for file in walk_cache_dir(cache_dir)? {
        let key = match read_cache_key(&file) {
            Ok(Some(key)) => key,
            Ok(None) => {
                warn!("Skipping cache file without parseable key: {}", file.display());
                continue;
            }
            Err(e) => {
                // The proxy may have removed the file mid-walk
                debug!("Skipping unreadable cache file {}: {}", file.display(), e);
                continue;
            }
        };

        let (entry_psid, url_path) = key;
        if entry_psid != psid || !predicate.matches(&url_path) {
            continue;
        }

        match fs::remove_file(&file) {
            Ok(()) => {
                debug!("Purged cache entry {} ({})", url_path, file.display());
                deleted += 1;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Failed to delete cache file {}: {}", file.display(), e);
            }
        }
    }

    Ok(deleted)
}

/// Enumerate all regular files under the cache directory
fn walk_cache_dir(cache_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![cache_dir.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable directory entry: {}", e);
                    continue;
                }
            };
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.is_file() {
                files.push(path);
            }
        }
    }

    Ok(files)
}

/// Read and parse the key of one cache file
fn read_cache_key(file: &Path) -> std::io::Result<Option<(String, String)>> {
    let mut handle = fs::File::open(file)?;
    let mut header = vec![0u8; HEADER_PREFIX_LEN];
    let mut filled = 0;

    // Read up to the prefix length; short files are fine
    while filled < header.len() {
        match handle.read(&mut header[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    header.truncate(filled);

    Ok(parse_cache_key(&header))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_cache_file(dir: &Path, name: &str, key: &str) -> PathBuf {
        let path = dir.join(name);
        let contents = format!("VERSION: 3\n{}{}\nbody bytes follow\n", "KEY: ", key);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_parse_cache_key() {
        // Key after a newline
        let header = b"VERSION: 3\nKEY: ps1:u=/a/x\nrest";
        assert_eq!(
            parse_cache_key(header),
            Some(("ps1".to_string(), "/a/x".to_string()))
        );

        // Key at the start of the file
        let header = b"KEY: ps2:u=/b\n";
        assert_eq!(
            parse_cache_key(header),
            Some(("ps2".to_string(), "/b".to_string()))
        );

        // Missing separator
        assert_eq!(parse_cache_key(b"KEY: garbage\n"), None);

        // Unterminated key line
        assert_eq!(parse_cache_key(b"KEY: ps1:u=/a"), None);

        // No key at all
        assert_eq!(parse_cache_key(b"just body bytes"), None);
    }

    #[test]
    fn test_purge_by_pattern() {
        // After a regex purge no remaining entry of the session matches
        let dir = tempfile::tempdir().unwrap();
        let a = write_cache_file(dir.path(), "0001", "ps1:u=/a/x");
        let b = write_cache_file(dir.path(), "0002", "ps1:u=/a/y");
        let c = write_cache_file(dir.path(), "0003", "ps2:u=/a/x");

        let predicate = CachePredicate::pattern("^/a/.*").unwrap();
        let deleted = purge_cache(dir.path(), "ps1", &predicate).unwrap();

        assert_eq!(deleted, 2);
        assert!(!a.exists());
        assert!(!b.exists());
        assert!(c.exists(), "Entries of other sessions must be retained");
    }

    #[test]
    fn test_purge_all_and_exact_path() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_cache_file(dir.path(), "0001", "ps1:u=/a/x");
        let b = write_cache_file(dir.path(), "0002", "ps1:u=/a/y");

        // Exact path match only removes the named entry
        let deleted =
            purge_cache(dir.path(), "ps1", &CachePredicate::Path("/a/x".to_string())).unwrap();
        assert_eq!(deleted, 1);
        assert!(!a.exists());
        assert!(b.exists());

        // Purge all removes the rest
        let deleted = purge_cache(dir.path(), "ps1", &CachePredicate::All).unwrap();
        assert_eq!(deleted, 1);
        assert!(!b.exists());
    }

    #[test]
    fn test_purge_by_prefix_walks_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("0/ab");
        fs::create_dir_all(&sub).unwrap();
        let nested = write_cache_file(&sub, "deadbeef", "ps1:u=/media/seg1.m4s");
        let other = write_cache_file(&sub, "cafebabe", "ps1:u=/other/seg2.m4s");

        let deleted = purge_cache(
            dir.path(),
            "ps1",
            &CachePredicate::Prefix("/media/".to_string()),
        )
        .unwrap();

        assert_eq!(deleted, 1);
        assert!(!nested.exists());
        assert!(other.exists());
    }

    #[test]
    fn test_unparseable_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("junk"), b"no key here").unwrap();

        let deleted = purge_cache(dir.path(), "ps1", &CachePredicate::All).unwrap();
        assert_eq!(deleted, 0);
        assert!(dir.path().join("junk").exists());
    }

    #[test]
    fn test_missing_cache_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let deleted = purge_cache(&missing, "ps1", &CachePredicate::All).unwrap();
        assert_eq!(deleted, 0);
    }

    #[test]
    fn test_bad_pattern_reports_error() {
        assert!(CachePredicate::pattern("([unclosed").is_err());
    }
}
