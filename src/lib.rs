//! 5GMS Application Server: M3 Control Plane for an External Web Proxy
//!
//! This library implements the control plane of a 5G media streaming
//! Application Server. It accepts the M3 provisioning interface from an
//! upstream Application Function, translates provisioning sessions,
//! content-hosting configurations and TLS certificates into a configuration
//! file for an external reverse proxy (e.g. nginx), supervises that proxy as
//! a child process, reloads it on changes and purges its on-disk cache on
//! request.
//!
//! # Main Features
//!
//! - Idempotent M3 CRUD on provisioning sessions and certificates
//! - Translation of content-hosting configurations into web-proxy server
//!   blocks, with deduplication of equivalent servers
//! - Child-process supervision with a rapid-restart guard
//! - Cache purging by exact path, path prefix or regular expression
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use arc_swap::ArcSwap;
//! use gms_app_server::config::AppConfig;
//! use gms_app_server::controller::AppController;
//! use gms_app_server::proxy::select_backend;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Arc::new(ArcSwap::from_pointee(AppConfig::default()));
//!     let backend = select_backend(config.clone()).expect("no web proxy installed");
//!     let code = AppController::new(config, None, backend).run().await;
//!     std::process::exit(code.into());
//! }
//! ```

// Public modules
pub mod api;
pub mod common;
pub mod config;
pub mod controller;
pub mod model;
pub mod proxy;
pub mod store;

// Re-export commonly used structures and functions for convenience
pub use common::{AppError, Result};
pub use controller::AppController;
pub use proxy::{select_backend, WebProxyBackend};
pub use store::ControlStore;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
