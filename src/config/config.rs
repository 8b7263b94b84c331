//! Configuration structures and methods
//!
//! This module defines the application configuration structure and related
//! methods for loading configuration from different sources (configuration
//! files and environment variables).

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::common::{check_file_exists, AppError, Result};
use crate::config::defaults;

/// Application configuration
///
/// Contains all configuration options needed by the Application Server:
/// the M3 listen address, the distribution ports the generated proxy
/// configuration binds, and the filesystem layout shared with the web proxy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[serde(default)]
pub struct AppConfig {
    /// Listen address for the M3 configuration API
    #[serde(default = "defaults::m3_listen")]
    pub m3_listen: SocketAddr,

    /// Port the proxy serves plain HTTP distributions on
    #[serde(default = "defaults::http_port")]
    pub http_port: u16,

    /// Port the proxy serves TLS distributions on
    #[serde(default = "defaults::https_port")]
    pub https_port: u16,

    /// Directory holding the certificate cache (one PEM file per id)
    #[serde(default = "defaults::certificates_cache_dir")]
    pub certificates_cache_dir: PathBuf,

    /// Web proxy on-disk cache directory; `None` disables caching directives
    #[serde(default = "defaults::proxy_cache_dir")]
    pub proxy_cache_dir: Option<PathBuf>,

    /// Path the generated proxy configuration is written to
    #[serde(default = "defaults::proxy_config_path")]
    pub proxy_config_path: PathBuf,

    /// Proxy error log path
    #[serde(default = "defaults::error_log_path")]
    pub error_log_path: PathBuf,

    /// Proxy access log path
    #[serde(default = "defaults::access_log_path")]
    pub access_log_path: PathBuf,

    /// Proxy pid file path
    #[serde(default = "defaults::pid_path")]
    pub pid_path: PathBuf,

    /// Client body temporary directory
    #[serde(default = "defaults::client_body_tmp")]
    pub client_body_tmp: PathBuf,

    /// Proxy temporary directory
    #[serde(default = "defaults::proxy_temp_path")]
    pub proxy_temp_path: PathBuf,

    /// FastCGI temporary directory
    #[serde(default = "defaults::fastcgi_temp_path")]
    pub fastcgi_temp_path: PathBuf,

    /// uWSGI temporary directory
    #[serde(default = "defaults::uwsgi_temp_path")]
    pub uwsgi_temp_path: PathBuf,

    /// SCGI temporary directory
    #[serde(default = "defaults::scgi_temp_path")]
    pub scgi_temp_path: PathBuf,

    /// Log level (debug, info, warn, error)
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
}

impl Default for AppConfig {
    /// Create a default configuration using centralized defaults
    fn default() -> Self {
        Self {
            m3_listen: defaults::m3_listen(),
            http_port: defaults::http_port(),
            https_port: defaults::https_port(),
            certificates_cache_dir: defaults::certificates_cache_dir(),
            proxy_cache_dir: defaults::proxy_cache_dir(),
            proxy_config_path: defaults::proxy_config_path(),
            error_log_path: defaults::error_log_path(),
            access_log_path: defaults::access_log_path(),
            pid_path: defaults::pid_path(),
            client_body_tmp: defaults::client_body_tmp(),
            proxy_temp_path: defaults::proxy_temp_path(),
            fastcgi_temp_path: defaults::fastcgi_temp_path(),
            uwsgi_temp_path: defaults::uwsgi_temp_path(),
            scgi_temp_path: defaults::scgi_temp_path(),
            log_level: defaults::log_level(),
        }
    }
}

impl AsRef<AppConfig> for AppConfig {
    fn as_ref(&self) -> &AppConfig {
        self
    }
}

impl AppConfig {
    /// Auto-detect and load configuration from the best available source
    ///
    /// This method tries to load configuration from the following sources in order:
    /// 1. Default configuration
    /// 2. Configuration file (the given path, or `config.json` if present)
    /// 3. Environment variables
    ///
    /// # Arguments
    ///
    /// * `config_file` - Optional explicit configuration file path
    pub fn auto_load(config_file: Option<&Path>) -> Result<Self> {
        use log::{debug, info};

        // Start with default configuration
        let mut config = Self::default();
        debug!("Starting with default configuration");

        // An explicitly named configuration file must exist
        if let Some(path) = config_file {
            check_file_exists(path)?;
            info!("Loading configuration from {}", path.display());
            config = config.merge(Self::from_file(path)?);
        } else if Path::new(defaults::DEFAULT_CONFIG_FILE).exists() {
            info!(
                "Loading configuration from {}",
                defaults::DEFAULT_CONFIG_FILE
            );
            match Self::from_file(defaults::DEFAULT_CONFIG_FILE) {
                Ok(file_config) => {
                    config = config.merge(file_config);
                    debug!("Merged default configuration file");
                }
                Err(e) => {
                    log::warn!("Failed to load default configuration file: {}", e);
                }
            }
        } else {
            debug!(
                "No default configuration file found at {}",
                defaults::DEFAULT_CONFIG_FILE
            );
        }

        // Try to load from environment variables
        match Self::from_env() {
            Ok(env_config) => {
                if env_config != Self::default() {
                    info!("Loading configuration from environment variables");
                    config = config.merge(env_config);
                    debug!("Merged environment variables configuration");
                } else {
                    debug!("No configuration found in environment variables");
                }
            }
            Err(e) => {
                log::warn!("Failed to load configuration from environment variables: {}", e);
            }
        }

        Ok(config)
    }

    /// Load configuration from environment variables
    ///
    /// This method loads configuration from environment variables with the
    /// prefix defined in `defaults::ENV_PREFIX` (`"GMS_APP_SERVER_"`).
    pub fn from_env() -> Result<Self> {
        use crate::config::defaults::ENV_PREFIX;
        use std::env;

        // Helper function to get environment variable with prefix
        let get_env = |name: &str| -> Option<String> {
            let full_name = format!("{}{}", ENV_PREFIX, name);
            env::var(&full_name).ok()
        };

        // Start with default configuration
        let mut config = Self::default();

        // Update configuration from environment variables
        if let Some(listen) = get_env("M3_LISTEN") {
            config.m3_listen = listen
                .parse()
                .map_err(|e| AppError::Config(format!("Invalid M3 listen address {}: {}", listen, e)))?;
        }

        if let Some(port) = get_env("HTTP_PORT") {
            config.http_port = port
                .parse()
                .map_err(|e| AppError::Config(format!("Invalid HTTP port {}: {}", port, e)))?;
        }

        if let Some(port) = get_env("HTTPS_PORT") {
            config.https_port = port
                .parse()
                .map_err(|e| AppError::Config(format!("Invalid HTTPS port {}: {}", port, e)))?;
        }

        if let Some(dir) = get_env("CERTIFICATES_CACHE_DIR") {
            config.certificates_cache_dir = dir.into();
        }

        if let Some(dir) = get_env("PROXY_CACHE_DIR") {
            config.proxy_cache_dir = if dir.is_empty() { None } else { Some(dir.into()) };
        }

        if let Some(path) = get_env("PROXY_CONFIG_PATH") {
            config.proxy_config_path = path.into();
        }

        if let Some(path) = get_env("ERROR_LOG_PATH") {
            config.error_log_path = path.into();
        }

        if let Some(path) = get_env("ACCESS_LOG_PATH") {
            config.access_log_path = path.into();
        }

        if let Some(path) = get_env("PID_PATH") {
            config.pid_path = path.into();
        }

        if let Some(log_level) = get_env("LOG_LEVEL") {
            config.log_level = log_level;
        }

        Ok(config)
    }

    /// Merge another configuration into this one
    ///
    /// Fields of `other` that differ from the defaults override the
    /// corresponding fields of `self`. This is used to implement the
    /// configuration priority system (defaults < file < env).
    pub fn merge(&self, other: impl AsRef<Self>) -> Self {
        let other = other.as_ref();
        let defaults = Self::default();

        macro_rules! pick {
            ($field:ident) => {
                if other.$field != defaults.$field {
                    other.$field.clone()
                } else {
                    self.$field.clone()
                }
            };
        }

        Self {
            m3_listen: pick!(m3_listen),
            http_port: pick!(http_port),
            https_port: pick!(https_port),
            certificates_cache_dir: pick!(certificates_cache_dir),
            proxy_cache_dir: pick!(proxy_cache_dir),
            proxy_config_path: pick!(proxy_config_path),
            error_log_path: pick!(error_log_path),
            access_log_path: pick!(access_log_path),
            pid_path: pick!(pid_path),
            client_body_tmp: pick!(client_body_tmp),
            proxy_temp_path: pick!(proxy_temp_path),
            fastcgi_temp_path: pick!(fastcgi_temp_path),
            uwsgi_temp_path: pick!(uwsgi_temp_path),
            scgi_temp_path: pick!(scgi_temp_path),
            log_level: pick!(log_level),
        }
    }

    /// Load configuration from file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the JSON configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!(
                "Failed to read configuration file {}: {}",
                path.display(),
                e
            ))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            AppError::Config(format!(
                "Failed to parse JSON configuration file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Validate configuration
    ///
    /// # Returns
    ///
    /// Returns `Ok(())` if configuration is valid, otherwise returns an error.
    pub fn validate(&self) -> Result<()> {
        // Distribution ports must differ so HTTP and TLS servers can coexist
        if self.http_port == self.https_port {
            return Err(AppError::Config(format!(
                "HTTP and HTTPS ports must differ, both are {}",
                self.http_port
            )));
        }

        // Validate log level
        match self.log_level.to_lowercase().as_str() {
            "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(AppError::Config(format!(
                    "Invalid log level: {}. Valid values are: debug, info, warn, error",
                    self.log_level
                )));
            }
        }

        Ok(())
    }

    /// Check configuration for potential issues
    ///
    /// Unlike `validate()`, this method does not return an error if issues
    /// are found; it returns a list of warnings.
    pub fn check(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !self.certificates_cache_dir.exists() {
            warnings.push(format!(
                "Certificate cache directory does not exist: {}",
                self.certificates_cache_dir.display()
            ));
        }

        if let Some(dir) = &self.proxy_cache_dir {
            if !dir.exists() {
                warnings.push(format!(
                    "Proxy cache directory does not exist: {}",
                    dir.display()
                ));
            }
        }

        if self.m3_listen.port() == 0 {
            warnings.push(format!(
                "M3 listen address has port 0, which will use a random port: {}",
                self.m3_listen
            ));
        }

        match self.log_level.to_lowercase().as_str() {
            "debug" | "info" | "warn" | "error" => {}
            _ => warnings.push(format!("Unknown log level: {}", self.log_level)),
        }

        warnings
    }

    /// Reload configuration from file
    ///
    /// This method reloads configuration from the specified file, merges it
    /// with the current configuration and validates the result.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    pub fn reload_from_file<P: AsRef<Path>>(&self, path: P) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Reloading configuration from file: {}", path.display());

        let new_config = Self::from_file(path)?;
        let merged_config = self.merge(new_config);
        merged_config.validate()?;

        for warning in merged_config.check() {
            log::warn!("Configuration warning: {}", warning);
        }

        log::info!("Configuration reloaded successfully");
        Ok(merged_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    fn test_default() {
        // Test default configuration
        let config = AppConfig::default();

        assert_eq!(config.m3_listen, defaults::m3_listen());
        assert_eq!(config.http_port, 80);
        assert_eq!(config.https_port, 443);
        assert_eq!(config.proxy_config_path, PathBuf::from("/tmp/rt_5gms_as.conf"));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_validation() {
        // Invalid log level is rejected
        let mut config = AppConfig::default();
        config.log_level = "invalid".to_string();
        assert!(config.validate().is_err());

        // Colliding ports are rejected
        config.log_level = "debug".to_string();
        config.https_port = config.http_port;
        assert!(config.validate().is_err());

        // Defaults validate cleanly
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_merge_priority() {
        // File settings survive an environment merge that leaves them alone
        let mut file = AppConfig::default();
        file.http_port = 8080;

        let mut env = AppConfig::default();
        env.log_level = "debug".to_string();

        let merged = AppConfig::default().merge(file).merge(env);
        assert_eq!(merged.http_port, 8080);
        assert_eq!(merged.log_level, "debug");
    }

    #[test]
    fn test_auto_load_rejects_missing_explicit_file() {
        // An explicitly named configuration file must exist
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(AppConfig::auto_load(Some(missing.as_path())).is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"http_port": 8080, "log_level": "debug"}"#).unwrap();

        // Listed fields override, everything else keeps its default
        let loaded = AppConfig::from_file(&path).unwrap();
        assert_eq!(loaded.http_port, 8080);
        assert_eq!(loaded.log_level, "debug");
        assert_eq!(loaded.https_port, 443);

        // Unknown fields are rejected
        fs::write(&path, r#"{"bogus": 1}"#).unwrap();
        assert!(AppConfig::from_file(&path).is_err());
    }

    #[test]
    #[serial]
    fn test_from_env() {
        // Set environment variables for testing
        env::set_var("GMS_APP_SERVER_M3_LISTEN", "127.0.0.1:9999");
        env::set_var("GMS_APP_SERVER_HTTP_PORT", "8080");
        env::set_var("GMS_APP_SERVER_LOG_LEVEL", "debug");

        let config = AppConfig::from_env();
        assert!(
            config.is_ok(),
            "Should be able to load configuration from environment variables"
        );

        if let Ok(config) = config {
            assert_eq!(config.m3_listen.to_string(), "127.0.0.1:9999");
            assert_eq!(config.http_port, 8080);
            assert_eq!(config.log_level, "debug");
        }

        // Clean up environment variables
        env::remove_var("GMS_APP_SERVER_M3_LISTEN");
        env::remove_var("GMS_APP_SERVER_HTTP_PORT");
        env::remove_var("GMS_APP_SERVER_LOG_LEVEL");
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_port() {
        env::set_var("GMS_APP_SERVER_HTTP_PORT", "not-a-port");
        assert!(AppConfig::from_env().is_err());
        env::remove_var("GMS_APP_SERVER_HTTP_PORT");
    }
}
