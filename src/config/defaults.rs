//! Default configuration values
//!
//! This module centralizes all default configuration values in one place.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// Environment variable prefix for all configuration options
pub const ENV_PREFIX: &str = "GMS_APP_SERVER_";

/// Default configuration file path
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Default M3 listen address as string
pub fn m3_listen_str() -> String {
    "127.0.0.1:7777".to_string()
}

/// Default M3 listen address
pub fn m3_listen() -> SocketAddr {
    SocketAddr::from_str(&m3_listen_str()).expect("Default M3 listen address should be valid")
}

/// Default plain HTTP distribution port
pub fn http_port() -> u16 {
    80
}

/// Default TLS distribution port
pub fn https_port() -> u16 {
    443
}

/// Default certificate cache directory
pub fn certificates_cache_dir() -> PathBuf {
    PathBuf::from("/var/cache/rt-5gms/as/certificates")
}

/// Default web proxy cache directory
pub fn proxy_cache_dir() -> Option<PathBuf> {
    Some(PathBuf::from("/var/cache/rt-5gms/as/cache"))
}

/// Default generated proxy configuration path
pub fn proxy_config_path() -> PathBuf {
    PathBuf::from("/tmp/rt_5gms_as.conf")
}

/// Default proxy error log path
pub fn error_log_path() -> PathBuf {
    PathBuf::from("/tmp/rt_5gms_as.error.log")
}

/// Default proxy access log path
pub fn access_log_path() -> PathBuf {
    PathBuf::from("/tmp/rt_5gms_as.access.log")
}

/// Default proxy pid file path
pub fn pid_path() -> PathBuf {
    PathBuf::from("/tmp/rt_5gms_as.pid")
}

/// Default client body temporary directory
pub fn client_body_tmp() -> PathBuf {
    PathBuf::from("/tmp/rt_5gms_as.client_body")
}

/// Default proxy temporary directory
pub fn proxy_temp_path() -> PathBuf {
    PathBuf::from("/tmp/rt_5gms_as.proxy_temp")
}

/// Default fastcgi temporary directory
pub fn fastcgi_temp_path() -> PathBuf {
    PathBuf::from("/tmp/rt_5gms_as.fastcgi_temp")
}

/// Default uwsgi temporary directory
pub fn uwsgi_temp_path() -> PathBuf {
    PathBuf::from("/tmp/rt_5gms_as.uwsgi_temp")
}

/// Default scgi temporary directory
pub fn scgi_temp_path() -> PathBuf {
    PathBuf::from("/tmp/rt_5gms_as.scgi_temp")
}

/// Default log level
pub fn log_level() -> String {
    "info".to_string()
}
