//! Certificate cache
//!
//! Directory-backed store of PEM files, one per certificate id. The filename
//! equals the id, and the directory is the sole persistent store: scanning it
//! on startup recovers the full certificate set.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::common::{atomic_write, AppError, Result};

/// Outcome of storing a certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stored {
    /// A new file was created
    Created,
    /// An existing file was replaced with different contents
    Replaced,
    /// The incoming bytes equal the stored bytes; nothing was written
    NoChange,
}

/// Directory-backed certificate store
#[derive(Debug)]
pub struct CertificateCache {
    directory: PathBuf,
    paths: HashMap<String, PathBuf>,
}

impl CertificateCache {
    /// Open a certificate cache over `directory`, creating it if needed and
    /// seeding the in-memory map from its current contents.
    pub fn open(directory: &Path) -> Result<Self> {
        fs::create_dir_all(directory).map_err(|e| {
            AppError::Certificate(format!(
                "Failed to create certificate cache directory {}: {}",
                directory.display(),
                e
            ))
        })?;

        let mut cache = Self {
            directory: directory.to_path_buf(),
            paths: HashMap::new(),
        };
        cache.scan()?;
        Ok(cache)
    }

    /// Re-scan the cache directory, replacing the in-memory map
    ///
    /// Used at startup and when the application is asked to reload its state
    /// from disk.
    pub fn scan(&mut self) -> Result<()> {
        let mut paths = HashMap::new();
        for entry in fs::read_dir(&self.directory)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(id) => {
                    debug!("Found cached certificate {}", id);
                    paths.insert(id, path);
                }
                Err(name) => {
                    warn!("Ignoring non-UTF-8 certificate filename {:?}", name);
                }
            }
        }
        self.paths = paths;
        debug!(
            "Certificate cache seeded with {} entries from {}",
            self.paths.len(),
            self.directory.display()
        );
        Ok(())
    }

    /// Store a certificate under `id`
    ///
    /// If a file with identical contents already exists this reports
    /// `NoChange` without writing. Otherwise the file is written to a
    /// temporary sibling and renamed into place.
    pub fn put(&mut self, id: &str, pem: &[u8]) -> Result<Stored> {
        let path = self.directory.join(id);

        let outcome = if path.exists() {
            let existing = fs::read(&path)?;
            if existing == pem {
                return Ok(Stored::NoChange);
            }
            Stored::Replaced
        } else {
            Stored::Created
        };

        atomic_write(&path, pem).map_err(|e| {
            AppError::Certificate(format!(
                "Failed to write certificate {}: {}",
                path.display(),
                e
            ))
        })?;
        self.paths.insert(id.to_string(), path);
        Ok(outcome)
    }

    /// Delete the certificate stored under `id`
    ///
    /// Returns `false` if no such certificate exists.
    pub fn delete(&mut self, id: &str) -> Result<bool> {
        match self.paths.remove(id) {
            Some(path) => {
                fs::remove_file(&path).map_err(|e| {
                    AppError::Certificate(format!(
                        "Failed to delete certificate {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Whether a certificate with the given id is present
    pub fn contains(&self, id: &str) -> bool {
        self.paths.contains_key(id)
    }

    /// On-disk path of the certificate with the given id
    pub fn path_of(&self, id: &str) -> Option<&Path> {
        self.paths.get(id).map(PathBuf::as_path)
    }

    /// All stored certificate ids
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.paths.keys().cloned().collect();
        ids.sort();
        ids
    }
}
