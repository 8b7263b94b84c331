//! Common module
//!
//! This module contains shared types, errors, and utility functions used throughout the application.

pub mod error;
pub mod fs;
pub mod log;
pub mod util;

// Re-export commonly used types and functions
pub use error::{AppError, Result};
pub use fs::{atomic_write, check_file_exists, find_executable_on_path, prepend_alternate_paths};
pub use log::init_logger;
pub use util::list_join;
