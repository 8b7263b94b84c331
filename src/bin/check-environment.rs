//! Environment check tool
//!
//! This tool checks which web proxy backends are installed on the running
//! system and which one the Application Server would select.

use std::process::exit;
use std::sync::Arc;

use arc_swap::ArcSwap;

use gms_app_server::common::{list_join, prepend_alternate_paths};
use gms_app_server::config::AppConfig;
use gms_app_server::proxy::{registered_backend_names, select_backend};

fn main() {
    // Initialize logger
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    println!("=== 5GMS Application Server Environment Check ===\n");

    prepend_alternate_paths();

    println!("Registered web proxy backends:");
    for name in registered_backend_names() {
        println!("  - {}", name);
    }

    let config = Arc::new(ArcSwap::from_pointee(AppConfig::default()));
    match select_backend(config) {
        Ok(backend) => {
            println!("\nSelected backend: {}", backend.name());
            println!("\nEnvironment is ready for the Application Server.");
        }
        Err(_) => {
            println!(
                "\nNo web proxy found. Please install at least one of: {}",
                list_join(&registered_backend_names(), ", ", Some(" or "))
            );
            exit(1);
        }
    }
}
