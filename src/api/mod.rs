//! M3 HTTP API
//!
//! This module sets up the HTTP server for the M3 configuration interface
//! using axum. The M3 interface is consumed by an upstream Application
//! Function; every mutation commits to the control store first and then
//! regenerates the web proxy configuration.

pub mod handlers;
pub mod problem;

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::proxy::WebProxyBackend;
use crate::store::ControlStore;

pub use problem::{InvalidParam, Problem, M3_PREFIX};

/// Shared state of the M3 handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<ArcSwap<AppConfig>>,

    /// Control store; all mutations serialize through this lock
    pub store: Arc<Mutex<ControlStore>>,

    /// Selected web proxy backend
    pub proxy: Arc<dyn WebProxyBackend>,
}

/// Build the M3 application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/3gpp-m3/v1/certificates",
            get(handlers::list_certificates),
        )
        .route(
            "/3gpp-m3/v1/certificates/:id",
            post(handlers::create_certificate)
                .put(handlers::update_certificate)
                .delete(handlers::delete_certificate),
        )
        .route(
            "/3gpp-m3/v1/content-hosting-configurations",
            get(handlers::list_content_hosting_configurations),
        )
        .route(
            "/3gpp-m3/v1/content-hosting-configurations/:psid",
            post(handlers::create_content_hosting_configuration)
                .put(handlers::update_content_hosting_configuration)
                .delete(handlers::delete_content_hosting_configuration),
        )
        .route(
            "/3gpp-m3/v1/content-hosting-configurations/:psid/purge",
            post(handlers::purge_content),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the M3 API on an already-bound listener
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> std::io::Result<()> {
    log::info!(
        "M3 API listening on {}",
        listener.local_addr().map(|a| a.to_string()).unwrap_or_default()
    );
    axum::serve(listener, build_router(state)).await
}
