//! nginx web proxy backend
//!
//! Implements the backend capability set for the nginx web server and
//! reverse proxy: presence detection on `PATH`, configuration generation
//! through the translator, daemon lifecycle through the supervisor, and
//! cache purging.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use log::{error, info};
use once_cell::sync::Lazy;

use crate::common::{atomic_write, find_executable_on_path, AppError, Result};
use crate::config::AppConfig;
use crate::store::ControlStore;

use super::purge::{purge_cache, CachePredicate};
use super::supervisor::{check_daemon_flags, DaemonExit, Supervisor};
use super::{render, Signal, WebProxyBackend};

/// Backend name in the registry
pub const BACKEND_NAME: &str = "nginx";

/// How long a presence-check result stays valid
const PRESENCE_CHECK_TTL: Duration = Duration::from_secs(5);

/// Cached result of the last executable lookup
static NGINX_PATH: Lazy<StdMutex<Option<(Instant, Option<PathBuf>)>>> =
    Lazy::new(|| StdMutex::new(None));

/// Locate the nginx executable, re-checking at most every five seconds
fn find_nginx() -> Option<PathBuf> {
    let mut cached = NGINX_PATH.lock().unwrap();
    let now = Instant::now();
    if let Some((checked_at, path)) = cached.as_ref() {
        if now.duration_since(*checked_at) < PRESENCE_CHECK_TTL {
            return path.clone();
        }
    }
    let path = find_executable_on_path("nginx");
    *cached = Some((now, path.clone()));
    path
}

/// nginx backend
pub struct NginxWebProxy {
    config: Arc<ArcSwap<AppConfig>>,
    supervisor: Supervisor,
}

impl NginxWebProxy {
    /// Create an nginx backend over the shared application configuration
    pub fn new(config: Arc<ArcSwap<AppConfig>>) -> Self {
        Self {
            config,
            supervisor: Supervisor::new(),
        }
    }
}

#[async_trait]
impl WebProxyBackend for NginxWebProxy {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn is_present(&self) -> bool {
        find_nginx().is_some()
    }

    async fn write_configuration(&self, store: &ControlStore) -> Result<()> {
        let config = self.config.load();
        let text = render::generate(store, &config)?;
        atomic_write(&config.proxy_config_path, text.as_bytes()).map_err(|e| {
            AppError::Proxy(format!(
                "failed to write {}: {}",
                config.proxy_config_path.display(),
                e
            ))
        })?;
        info!(
            "Wrote nginx configuration to {}",
            config.proxy_config_path.display()
        );
        Ok(())
    }

    fn tidy_configuration(&self) -> Result<()> {
        let config = self.config.load();
        fs::remove_file(&config.proxy_config_path).map_err(|e| {
            AppError::Proxy(format!(
                "failed to remove {}: {}",
                config.proxy_config_path.display(),
                e
            ))
        })
    }

    async fn start_daemon(&self) -> Result<()> {
        let cmd = find_nginx()
            .ok_or_else(|| AppError::Proxy("nginx is no longer installed".to_string()))?;
        let cmd = cmd.to_string_lossy().into_owned();

        let config = self.config.load();
        let error_log = config.error_log_path.display().to_string();
        let conf = config.proxy_config_path.display().to_string();

        // Only pass the flags this nginx build understands
        let argv = check_daemon_flags(
            &cmd,
            &[
                ("-e", Some(error_log.as_str())),
                ("-c", Some(conf.as_str())),
                ("-g", Some("daemon off;")),
            ],
        )
        .await;

        self.supervisor.start(&argv).await
    }

    async fn wait(&self) -> Result<Option<DaemonExit>> {
        let exit = self.supervisor.wait().await?;
        if let Some(exit) = &exit {
            if exit.success() {
                if !exit.stdout.is_empty() {
                    info!("{}", exit.stdout);
                }
            } else {
                if !exit.stdout.is_empty() {
                    info!("{}", exit.stdout);
                }
                if !exit.stderr.is_empty() {
                    error!("{}", exit.stderr);
                }
            }
        }
        Ok(exit)
    }

    async fn stop_daemon(&self) -> Result<()> {
        self.supervisor.stop().await
    }

    fn signal_daemon(&self, sig: Signal) -> Result<bool> {
        self.supervisor.signal(sig)
    }

    fn reload(&self) -> Result<bool> {
        self.supervisor.signal(Signal::SIGHUP)
    }

    fn rapid_start_count(&self) -> usize {
        self.supervisor.rapid_start_count()
    }

    async fn purge(&self, psid: &str, predicate: &CachePredicate) -> Result<usize> {
        let config = self.config.load();
        let Some(cache_dir) = config.proxy_cache_dir.clone() else {
            return Ok(0);
        };

        let deleted = purge_cache(&cache_dir, psid, predicate)?;
        if deleted > 0 {
            info!(
                "Purged {} cache entries for provisioning session {}",
                deleted, psid
            );
            // Drop the daemon's in-memory references to the deleted entries
            self.reload()?;
        }
        Ok(deleted)
    }
}
