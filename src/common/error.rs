//! Error handling module
//!
//! This module defines the error types and result type aliases used in the application.

use std::io;
use thiserror::Error;

use crate::store::StoreError;

/// 5GMS Application Server error type
#[derive(Error, Debug)]
pub enum AppError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Control store error
    #[error("Control store error: {0}")]
    Store(#[from] StoreError),

    /// Web proxy backend error
    #[error("Web proxy error: {0}")]
    Proxy(String),

    /// Certificate error
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// Path rewrite rule error
    #[error("Invalid path rewrite rule: {0}")]
    RewriteRule(String),

    /// Task join error
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        // Test IO error conversion
        let io_err = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let app_err: AppError = io_err.into();

        match app_err {
            AppError::Io(_) => {}
            _ => panic!("Should convert to IO error"),
        }
    }

    #[test]
    fn test_error_display() {
        // Test error display
        let err = AppError::Config("Invalid configuration".to_string());
        let err_str = format!("{}", err);
        assert!(err_str.contains("Invalid configuration"));
    }

    #[test]
    fn test_store_error_conversion() {
        // Test store error conversion
        let store_err = StoreError::NotFound("ps1".to_string());
        let app_err: AppError = store_err.into();
        assert!(format!("{}", app_err).contains("ps1"));
    }
}
