//! 5GMS Application Server Command Line Interface

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use clap::Parser;

use gms_app_server::common::init_logger;
use gms_app_server::common::prepend_alternate_paths;
use gms_app_server::config::AppConfig;
use gms_app_server::controller::AppController;
use gms_app_server::proxy::select_backend;

/// 5GMS Application Server
///
/// Accepts the M3 configuration interface and supervises an external web
/// proxy serving the configured content.
#[derive(Parser, Debug)]
#[command(name = "gms-app-server", version, about)]
struct Args {
    /// Application configuration file (JSON)
    config: Option<PathBuf>,

    /// Log level override (debug, info, warn, error)
    #[arg(short, long, env = "GMS_APP_SERVER_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Load configuration using a unified approach
    let mut config = match AppConfig::auto_load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    if let Some(level) = args.log_level {
        config.log_level = level;
    }

    // Initialize logger
    init_logger(&config.log_level);

    if let Err(e) = config.validate() {
        log::error!("{}", e);
        std::process::exit(1);
    }
    for warning in config.check() {
        log::warn!("Configuration warning: {}", warning);
    }

    // The web proxy may live outside the default search path
    prepend_alternate_paths();

    let config = Arc::new(ArcSwap::from_pointee(config));
    let backend = match select_backend(config.clone()) {
        Ok(backend) => backend,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };

    let controller = AppController::new(config, args.config, backend);
    let code = controller.run().await;
    std::process::exit(code.into());
}
