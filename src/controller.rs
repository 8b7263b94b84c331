//! Application controller
//!
//! Drives the whole Application Server: seeds the certificate cache, writes
//! the initial proxy configuration, starts the proxy daemon and the M3 API
//! server, and then multiplexes process signals, daemon exits and API-server
//! exit in one supervision loop. A daemon that keeps crashing trips the
//! rapid-restart guard and takes the whole server down.

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use log::{error, info, warn};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Mutex;

use crate::api::{self, AppState};
use crate::config::AppConfig;
use crate::proxy::WebProxyBackend;
use crate::store::ControlStore;

/// Daemon starts tolerated inside the rapid-start window before giving up
const RAPID_START_LIMIT: usize = 5;

/// Application controller
pub struct AppController {
    config: Arc<ArcSwap<AppConfig>>,
    config_file: Option<PathBuf>,
    backend: Arc<dyn WebProxyBackend>,
}

impl AppController {
    /// Create a controller over the shared configuration and the selected
    /// web proxy backend
    pub fn new(
        config: Arc<ArcSwap<AppConfig>>,
        config_file: Option<PathBuf>,
        backend: Arc<dyn WebProxyBackend>,
    ) -> Self {
        Self {
            config,
            config_file,
            backend,
        }
    }

    /// Run the Application Server until shutdown
    ///
    /// # Returns
    ///
    /// The process exit code: 0 on clean shutdown, 1 on a fatal start,
    /// restart or M3 failure, 2 when post-shutdown configuration cleanup
    /// failed.
    pub async fn run(self) -> u8 {
        match self.run_supervised().await {
            Ok(code) => code,
            Err(e) => {
                error!("{}", e);
                1
            }
        }
    }

    async fn run_supervised(&self) -> crate::common::Result<u8> {
        let config = self.config.load_full();

        // Seed the certificate cache from disk and build the control store
        let store = Arc::new(Mutex::new(ControlStore::new(
            &config.certificates_cache_dir,
        )?));

        // The daemon cannot start without an initial configuration
        {
            let store = store.lock().await;
            self.backend.write_configuration(&store).await?;
        }

        self.backend.start_daemon().await?;
        info!("Started {} web proxy", self.backend.name());

        // Start the M3 API server
        let listener = tokio::net::TcpListener::bind(config.m3_listen).await?;
        let state = AppState {
            config: self.config.clone(),
            store: store.clone(),
            proxy: self.backend.clone(),
        };
        let mut api_task = tokio::spawn(api::serve(listener, state));

        // Process signals
        let mut sighup = signal(SignalKind::hangup())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigquit = signal(SignalKind::quit())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        let mut exit_code: u8 = 0;

        loop {
            tokio::select! {
                _ = sighup.recv() => {
                    if let Err(e) = self.handle_reload(&store).await {
                        warn!("Reload failed: {}", e);
                    }
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down");
                    break;
                }
                _ = sigquit.recv() => {
                    info!("Received SIGQUIT, shutting down");
                    break;
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down");
                    break;
                }
                exit = self.backend.wait() => {
                    match exit {
                        Ok(Some(exit)) => {
                            warn!(
                                "{} exited unexpectedly with code {:?}",
                                self.backend.name(),
                                exit.code
                            );
                        }
                        Ok(None) => {
                            warn!("{} is not running", self.backend.name());
                        }
                        Err(e) => {
                            error!("Failed waiting for {}: {}", self.backend.name(), e);
                            exit_code = 1;
                            break;
                        }
                    }

                    if self.backend.rapid_start_count() > RAPID_START_LIMIT {
                        error!(
                            "{} restarted more than {} times in a short period, giving up",
                            self.backend.name(),
                            RAPID_START_LIMIT
                        );
                        exit_code = 1;
                        break;
                    }

                    info!("Restarting {} web proxy", self.backend.name());
                    if let Err(e) = self.backend.start_daemon().await {
                        error!("Failed to restart {}: {}", self.backend.name(), e);
                        exit_code = 1;
                        break;
                    }
                }
                result = &mut api_task => {
                    match result {
                        Ok(Ok(())) => error!("M3 API server stopped unexpectedly"),
                        Ok(Err(e)) => error!("M3 API server failed: {}", e),
                        Err(e) => error!("M3 API server task failed: {}", e),
                    }
                    exit_code = 1;
                    break;
                }
            }
        }

        api_task.abort();
        Ok(self.teardown(exit_code).await)
    }

    /// Reload state from disk after a SIGHUP
    ///
    /// Re-reads the application configuration file (when one was given),
    /// re-scans the certificate cache directory, re-verifies certificate
    /// cross-references, rewrites the proxy configuration and asks the
    /// daemon to reload it.
    async fn handle_reload(&self, store: &Arc<Mutex<ControlStore>>) -> crate::common::Result<()> {
        info!("Received SIGHUP, reloading");

        if let Some(path) = &self.config_file {
            let current = self.config.load_full();
            match current.reload_from_file(path) {
                Ok(new_config) => {
                    self.config.store(Arc::new(new_config));
                }
                Err(e) => {
                    warn!("Keeping previous configuration: {}", e);
                }
            }
        }

        let mut store = store.lock().await;
        store.reload_certificates()?;
        for (psid, cert_id) in store.reassess_cross_references() {
            warn!(
                "Provisioning session {} references missing certificate {}",
                psid, cert_id
            );
        }

        self.backend.write_configuration(&store).await?;
        if !self.backend.reload()? {
            warn!("{} is not running, reload signal skipped", self.backend.name());
        }
        Ok(())
    }

    /// Stop the daemon and remove the generated configuration
    async fn teardown(&self, exit_code: u8) -> u8 {
        let mut exit_code = exit_code;

        if let Err(e) = self.backend.stop_daemon().await {
            error!("Failed to stop {}: {}", self.backend.name(), e);
            exit_code = 1;
        }

        if let Err(e) = self.backend.tidy_configuration() {
            warn!("Unable to tidy up after {}: {}", self.backend.name(), e);
            if exit_code == 0 {
                exit_code = 2;
            }
        }

        exit_code
    }
}
