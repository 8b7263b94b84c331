//! Web proxy backends
//!
//! This module defines the capability set a web proxy backend must provide
//! and a compile-time registry that selects the highest-priority backend
//! installed on the running system. The Application Server itself never
//! serves media; everything downstream-facing goes through the selected
//! backend.

pub mod nginx;
pub mod purge;
pub mod render;
pub mod rewrite;
pub mod supervisor;

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use log::info;

use crate::common::{list_join, AppError, Result};
use crate::config::AppConfig;
use crate::store::ControlStore;

pub use nginx::NginxWebProxy;
pub use purge::CachePredicate;
pub use supervisor::{DaemonExit, Supervisor};

// Re-exported so callers signal the daemon without naming nix directly
pub use nix::sys::signal::Signal;

/// Capability set of a web proxy backend
///
/// A backend wraps one external reverse-proxy implementation: it knows how
/// to detect the proxy on the system, write its configuration from the
/// control store, and drive its process lifecycle.
#[async_trait]
pub trait WebProxyBackend: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &'static str;

    /// Whether the proxy executable is available on this system
    fn is_present(&self) -> bool;

    /// Translate the control store into the proxy configuration file
    ///
    /// All-or-nothing: on failure no file is written.
    async fn write_configuration(&self, store: &ControlStore) -> Result<()>;

    /// Delete the generated configuration file
    fn tidy_configuration(&self) -> Result<()>;

    /// Start the proxy daemon in the foreground
    async fn start_daemon(&self) -> Result<()>;

    /// Wait for the daemon to exit; cancellable without killing it
    async fn wait(&self) -> Result<Option<DaemonExit>>;

    /// Stop the daemon and wait for it
    async fn stop_daemon(&self) -> Result<()>;

    /// Forward a POSIX signal to the daemon; `false` when it is not running
    fn signal_daemon(&self, sig: Signal) -> Result<bool>;

    /// Ask the running daemon to reload its configuration
    fn reload(&self) -> Result<bool>;

    /// Number of daemon starts within the rapid-start window
    fn rapid_start_count(&self) -> usize;

    /// Purge cached entries of a provisioning session matching a predicate
    ///
    /// Returns the number of deleted cache entries. The daemon is signalled
    /// afterwards when anything was deleted.
    async fn purge(&self, psid: &str, predicate: &CachePredicate) -> Result<usize>;
}

/// All backends known at compile time, in priority order
fn registered_backends(config: Arc<ArcSwap<AppConfig>>) -> Vec<Arc<dyn WebProxyBackend>> {
    vec![Arc::new(NginxWebProxy::new(config))]
}

/// Names of all registered backends, in priority order
pub fn registered_backend_names() -> Vec<&'static str> {
    vec![nginx::BACKEND_NAME]
}

/// Select the highest-priority backend present on this system
///
/// # Returns
///
/// Returns an error naming the installable proxies when none is found.
pub fn select_backend(config: Arc<ArcSwap<AppConfig>>) -> Result<Arc<dyn WebProxyBackend>> {
    for backend in registered_backends(config) {
        if backend.is_present() {
            info!("Selected {} web proxy backend", backend.name());
            return Ok(backend);
        }
    }
    Err(AppError::Proxy(format!(
        "no web proxy found, please install at least one of: {}",
        list_join(&registered_backend_names(), ", ", Some(" or "))
    )))
}
