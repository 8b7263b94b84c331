//! Control store
//!
//! This module holds the in-memory control-plane state behind the M3 API:
//! provisioning sessions with their content-hosting configurations, and the
//! certificate set persisted through the directory-backed certificate cache.
//! All mutators are idempotent in the "no change" sense: re-submitting
//! identical content is detected via a content-equivalence hash and reported
//! as `NoChange` so callers can skip a proxy reload.

pub mod certificates;

use std::collections::HashMap;
use std::path::Path;

use log::{debug, info};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::model::ContentHostingConfiguration;
use certificates::{CertificateCache, Stored};

/// Control store error type
#[derive(Error, Debug)]
pub enum StoreError {
    /// The resource already exists (create on an existing id)
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// The resource does not exist
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The resource is still referenced and may not be deleted
    #[error("Resource in use: {0}")]
    InUse(String),

    /// A request parameter violates the data model
    #[error("Invalid {param}: {reason}")]
    Invalid {
        /// Offending parameter name
        param: String,
        /// Human-readable reason
        reason: String,
    },

    /// Underlying certificate cache failure
    #[error("Certificate store error: {0}")]
    Certificates(String),
}

/// Outcome of an update operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The stored content was replaced
    Updated,
    /// The new content equals the stored content
    NoChange,
}

type StoreResult<T> = std::result::Result<T, StoreError>;

/// Content-equivalence hash of a serializable value
fn content_hash<T: serde::Serialize>(value: &T) -> [u8; 32] {
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    Sha256::digest(&bytes).into()
}

struct ChcEntry {
    chc: ContentHostingConfiguration,
    hash: [u8; 32],
}

/// In-memory control-plane state
///
/// Owns the provisioning-session map and the certificate cache. All
/// cross-reference invariants between the two are enforced here: a
/// distribution configuration may only name an existing certificate, and a
/// certificate referenced by any distribution configuration may not be
/// deleted.
pub struct ControlStore {
    chcs: HashMap<String, ChcEntry>,
    certificates: CertificateCache,
}

impl ControlStore {
    /// Create a control store backed by the certificate cache directory
    ///
    /// The directory contents seed the initial certificate set.
    pub fn new(certificates_dir: &Path) -> crate::common::Result<Self> {
        let certificates = CertificateCache::open(certificates_dir)?;
        Ok(Self {
            chcs: HashMap::new(),
            certificates,
        })
    }

    /// Add a content-hosting configuration for a new provisioning session
    pub fn add_chc(&mut self, psid: &str, chc: ContentHostingConfiguration) -> StoreResult<()> {
        if self.chcs.contains_key(psid) {
            return Err(StoreError::AlreadyExists(psid.to_string()));
        }
        self.validate_chc(&chc)?;

        let hash = content_hash(&chc);
        self.chcs.insert(psid.to_string(), ChcEntry { chc, hash });
        info!("Added content hosting configuration for {}", psid);
        Ok(())
    }

    /// Replace the content-hosting configuration of an existing session
    ///
    /// # Returns
    ///
    /// `None` if the provisioning session is unknown, `Some(NoChange)` if the
    /// new content hashes equal to the stored content, `Some(Updated)`
    /// otherwise.
    pub fn update_chc(
        &mut self,
        psid: &str,
        chc: ContentHostingConfiguration,
    ) -> StoreResult<Option<UpdateOutcome>> {
        if !self.chcs.contains_key(psid) {
            return Ok(None);
        }
        self.validate_chc(&chc)?;

        let hash = content_hash(&chc);
        let entry = self.chcs.get_mut(psid).expect("presence checked above");
        if entry.hash == hash {
            debug!("Content hosting configuration for {} unchanged", psid);
            return Ok(Some(UpdateOutcome::NoChange));
        }
        entry.chc = chc;
        entry.hash = hash;
        info!("Updated content hosting configuration for {}", psid);
        Ok(Some(UpdateOutcome::Updated))
    }

    /// Remove the content-hosting configuration of a provisioning session
    ///
    /// Returns `true` if an entry was removed.
    pub fn delete_chc(&mut self, psid: &str) -> bool {
        let removed = self.chcs.remove(psid).is_some();
        if removed {
            info!("Deleted content hosting configuration for {}", psid);
        }
        removed
    }

    /// Whether a provisioning session exists
    pub fn has_chc(&self, psid: &str) -> bool {
        self.chcs.contains_key(psid)
    }

    /// Content-hosting configuration of a provisioning session
    pub fn get_chc(&self, psid: &str) -> Option<&ContentHostingConfiguration> {
        self.chcs.get(psid).map(|e| &e.chc)
    }

    /// All known provisioning session ids, sorted
    pub fn psids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.chcs.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Add a new certificate
    pub fn add_cert(&mut self, id: &str, pem: &[u8]) -> StoreResult<()> {
        if self.certificates.contains(id) {
            return Err(StoreError::AlreadyExists(id.to_string()));
        }
        self.certificates
            .put(id, pem)
            .map_err(|e| StoreError::Certificates(e.to_string()))?;
        info!("Added certificate {}", id);
        Ok(())
    }

    /// Replace an existing certificate
    ///
    /// # Returns
    ///
    /// `None` if the certificate is unknown, `Some(NoChange)` if the stored
    /// bytes already equal the incoming bytes, `Some(Updated)` otherwise.
    pub fn update_cert(&mut self, id: &str, pem: &[u8]) -> StoreResult<Option<UpdateOutcome>> {
        if !self.certificates.contains(id) {
            return Ok(None);
        }
        let stored = self
            .certificates
            .put(id, pem)
            .map_err(|e| StoreError::Certificates(e.to_string()))?;
        match stored {
            Stored::NoChange => Ok(Some(UpdateOutcome::NoChange)),
            _ => {
                info!("Updated certificate {}", id);
                Ok(Some(UpdateOutcome::Updated))
            }
        }
    }

    /// Delete a certificate
    ///
    /// Fails with `InUse` if any distribution configuration still references
    /// the certificate, and with `NotFound` if it does not exist.
    pub fn delete_cert(&mut self, id: &str) -> StoreResult<()> {
        if !self.certificates.contains(id) {
            return Err(StoreError::NotFound(id.to_string()));
        }
        for (psid, entry) in &self.chcs {
            if entry.chc.certificate_ids().any(|c| c == id) {
                return Err(StoreError::InUse(format!(
                    "certificate {} is referenced by provisioning session {}",
                    id, psid
                )));
            }
        }
        self.certificates
            .delete(id)
            .map_err(|e| StoreError::Certificates(e.to_string()))?;
        info!("Deleted certificate {}", id);
        Ok(())
    }

    /// Whether a certificate with the given id exists
    pub fn has_cert(&self, id: &str) -> bool {
        self.certificates.contains(id)
    }

    /// On-disk path of a certificate
    pub fn cert_path(&self, id: &str) -> Option<&Path> {
        self.certificates.path_of(id)
    }

    /// All stored certificate ids, sorted
    pub fn cert_ids(&self) -> Vec<String> {
        self.certificates.ids()
    }

    /// Re-scan the certificate cache directory from disk
    pub fn reload_certificates(&mut self) -> crate::common::Result<()> {
        self.certificates.scan()
    }

    /// Re-verify that every referenced certificate exists
    ///
    /// Used after a bulk reload of the certificate cache. Returns the list of
    /// `(provisioning session id, certificate id)` pairs whose reference is
    /// now dangling.
    pub fn reassess_cross_references(&self) -> Vec<(String, String)> {
        let mut violations = Vec::new();
        for (psid, entry) in &self.chcs {
            for cert_id in entry.chc.certificate_ids() {
                if !self.certificates.contains(cert_id) {
                    violations.push((psid.clone(), cert_id.to_string()));
                }
            }
        }
        violations
    }

    fn validate_chc(&self, chc: &ContentHostingConfiguration) -> StoreResult<()> {
        chc.validate_ingest().map_err(|reason| StoreError::Invalid {
            param: "ingestConfiguration".to_string(),
            reason,
        })?;
        for cert_id in chc.certificate_ids() {
            if !self.certificates.contains(cert_id) {
                return Err(StoreError::Invalid {
                    param: "certificateId".to_string(),
                    reason: format!("unknown certificate {}", cert_id),
                });
            }
        }
        Ok(())
    }
}
