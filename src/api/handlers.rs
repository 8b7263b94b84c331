//! M3 request handlers
//!
//! This module implements all HTTP request handlers for the M3 interface.
//! Handlers return `Result<Response, Problem>`; every predictable failure is
//! surfaced as an RFC 7807 problem with the status codes mandated by the M3
//! specification. A successful mutation commits the control store first and
//! only then regenerates the proxy configuration and reloads the daemon.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use http::{header, HeaderMap, StatusCode};
use log::{debug, warn};
use serde::Deserialize;

use crate::model::ContentHostingConfiguration;
use crate::proxy::CachePredicate;
use crate::store::{ControlStore, StoreError, UpdateOutcome};

use super::problem::{Problem, M3_PREFIX};
use super::AppState;

/// Media type of certificate bodies
const PEM_CONTENT_TYPE: &str = "application/x-pem-file";

/// Media type of content-hosting-configuration bodies
const JSON_CONTENT_TYPE: &str = "application/json";

/// Media type of purge bodies
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Optional purge request body
#[derive(Debug, Deserialize)]
struct PurgeParams {
    pattern: Option<String>,
}

/// Media type of a request, lowercased and without parameters
fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
}

fn require_content_type(
    headers: &HeaderMap,
    expected: &str,
    instance: &str,
) -> Result<(), Problem> {
    match content_type(headers) {
        Some(ct) if ct == expected => Ok(()),
        other => Err(Problem::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Unsupported media type",
        )
        .with_detail(format!(
            "expected {}, got {}",
            expected,
            other.as_deref().unwrap_or("no content type")
        ))
        .with_instance(instance)),
    }
}

/// Regenerate the proxy configuration and ask the daemon to reload
///
/// Called with the store lock still held so concurrent M3 mutations
/// serialize with their reloads. A missing daemon is tolerated; a failed
/// configuration write is fatal to the request.
async fn apply_configuration(
    state: &AppState,
    store: &ControlStore,
    instance: &str,
) -> Result<(), Problem> {
    state.proxy.write_configuration(store).await.map_err(|e| {
        Problem::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to write proxy configuration",
        )
        .with_detail(e.to_string())
        .with_instance(instance)
    })?;

    match state.proxy.reload() {
        Ok(true) => debug!("Asked proxy to reload its configuration"),
        Ok(false) => debug!("Proxy not running, skipping reload"),
        Err(e) => warn!("Failed to reload proxy: {}", e),
    }
    Ok(())
}

fn certificate_instance(id: &str) -> String {
    format!("{}/certificates/{}", M3_PREFIX, id)
}

fn chc_instance(psid: &str) -> String {
    format!("{}/content-hosting-configurations/{}", M3_PREFIX, psid)
}

/// POST a new certificate
pub async fn create_certificate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, Problem> {
    let instance = certificate_instance(&id);
    require_content_type(&headers, PEM_CONTENT_TYPE, &instance)?;

    let mut store = state.store.lock().await;
    match store.add_cert(&id, &body) {
        Ok(()) => Ok((
            StatusCode::CREATED,
            [(header::LOCATION, instance)],
        )
            .into_response()),
        Err(StoreError::AlreadyExists(_)) => Err(Problem::new(
            StatusCode::METHOD_NOT_ALLOWED,
            "Certificate already exists",
        )
        .with_instance(&instance)),
        Err(e) => Err(Problem::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Certificate store failure",
        )
        .with_detail(e.to_string())
        .with_instance(&instance)),
    }
}

/// PUT new contents for an existing certificate
pub async fn update_certificate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, Problem> {
    let instance = certificate_instance(&id);
    require_content_type(&headers, PEM_CONTENT_TYPE, &instance)?;

    let mut store = state.store.lock().await;
    match store.update_cert(&id, &body) {
        Ok(None) => Err(Problem::new(StatusCode::NOT_FOUND, "Certificate not found")
            .with_instance(&instance)),
        Ok(Some(UpdateOutcome::NoChange)) => Ok(StatusCode::NO_CONTENT.into_response()),
        Ok(Some(UpdateOutcome::Updated)) => {
            // Distributions referencing this certificate must see the new file
            apply_configuration(&state, &store, &instance).await?;
            Ok(StatusCode::OK.into_response())
        }
        Err(e) => Err(Problem::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Certificate store failure",
        )
        .with_detail(e.to_string())
        .with_instance(&instance)),
    }
}

/// DELETE a certificate
pub async fn delete_certificate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, Problem> {
    let instance = certificate_instance(&id);

    let mut store = state.store.lock().await;
    match store.delete_cert(&id) {
        Ok(()) => Ok(StatusCode::NO_CONTENT.into_response()),
        Err(StoreError::NotFound(_)) => Err(Problem::new(
            StatusCode::NOT_FOUND,
            "Certificate not found",
        )
        .with_instance(&instance)),
        Err(StoreError::InUse(detail)) => Err(Problem::new(
            StatusCode::CONFLICT,
            "Certificate in use",
        )
        .with_detail(detail)
        .with_instance(&instance)),
        Err(e) => Err(Problem::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Certificate store failure",
        )
        .with_detail(e.to_string())
        .with_instance(&instance)),
    }
}

/// GET the resource paths of all certificates
pub async fn list_certificates(State(state): State<AppState>) -> Response {
    let store = state.store.lock().await;
    let paths: Vec<String> = store
        .cert_ids()
        .iter()
        .map(|id| certificate_instance(id))
        .collect();
    Json(paths).into_response()
}

/// POST a new content hosting configuration
pub async fn create_content_hosting_configuration(
    State(state): State<AppState>,
    Path(psid): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, Problem> {
    let instance = chc_instance(&psid);
    require_content_type(&headers, JSON_CONTENT_TYPE, &instance)?;
    let chc = parse_chc(&body, &instance)?;

    let mut store = state.store.lock().await;
    match store.add_chc(&psid, chc) {
        Ok(()) => {
            apply_configuration(&state, &store, &instance).await?;
            Ok((
                StatusCode::CREATED,
                [(header::LOCATION, instance)],
            )
                .into_response())
        }
        Err(StoreError::AlreadyExists(_)) => Err(Problem::new(
            StatusCode::METHOD_NOT_ALLOWED,
            "Provisioning session already exists",
        )
        .with_instance(&instance)),
        Err(e) => Err(store_problem(e, &instance)),
    }
}

/// PUT a replacement content hosting configuration
pub async fn update_content_hosting_configuration(
    State(state): State<AppState>,
    Path(psid): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, Problem> {
    let instance = chc_instance(&psid);
    require_content_type(&headers, JSON_CONTENT_TYPE, &instance)?;
    let chc = parse_chc(&body, &instance)?;

    let mut store = state.store.lock().await;
    match store.update_chc(&psid, chc) {
        Ok(None) => Err(Problem::new(
            StatusCode::NOT_FOUND,
            "Provisioning session not found",
        )
        .with_instance(&instance)),
        Ok(Some(UpdateOutcome::NoChange)) => Ok(StatusCode::NO_CONTENT.into_response()),
        Ok(Some(UpdateOutcome::Updated)) => {
            apply_configuration(&state, &store, &instance).await?;
            Ok(StatusCode::OK.into_response())
        }
        Err(e) => Err(store_problem(e, &instance)),
    }
}

/// DELETE a content hosting configuration
pub async fn delete_content_hosting_configuration(
    State(state): State<AppState>,
    Path(psid): Path<String>,
) -> Result<Response, Problem> {
    let instance = chc_instance(&psid);

    let mut store = state.store.lock().await;
    if !store.delete_chc(&psid) {
        return Err(Problem::new(
            StatusCode::NOT_FOUND,
            "Provisioning session not found",
        )
        .with_instance(&instance));
    }

    // Cached content of the deleted session is no longer servable
    if let Err(e) = state.proxy.purge(&psid, &CachePredicate::All).await {
        warn!("Failed to purge cache for deleted session {}: {}", psid, e);
    }

    apply_configuration(&state, &store, &instance).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// GET the resource paths of all content hosting configurations
pub async fn list_content_hosting_configurations(State(state): State<AppState>) -> Response {
    let store = state.store.lock().await;
    let paths: Vec<String> = store.psids().iter().map(|psid| chc_instance(psid)).collect();
    Json(paths).into_response()
}

/// POST a purge request for one provisioning session
pub async fn purge_content(
    State(state): State<AppState>,
    Path(psid): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, Problem> {
    let instance = format!("{}/purge", chc_instance(&psid));

    let store = state.store.lock().await;
    if !store.has_chc(&psid) {
        return Err(Problem::new(
            StatusCode::NOT_FOUND,
            "Provisioning session not found",
        )
        .with_instance(&instance));
    }

    let predicate = if body.is_empty() {
        CachePredicate::All
    } else {
        require_content_type(&headers, FORM_CONTENT_TYPE, &instance)?;
        let params: PurgeParams = serde_urlencoded::from_bytes(&body).map_err(|e| {
            Problem::new(StatusCode::UNSUPPORTED_MEDIA_TYPE, "Malformed purge body")
                .with_detail(e.to_string())
                .with_instance(&instance)
        })?;
        match params.pattern {
            Some(pattern) => CachePredicate::pattern(&pattern).map_err(|reason| {
                Problem::new(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "Invalid purge pattern",
                )
                .with_invalid_param("pattern", Some(reason))
                .with_instance(&instance)
            })?,
            None => CachePredicate::All,
        }
    };

    let deleted = state.proxy.purge(&psid, &predicate).await.map_err(|e| {
        Problem::new(StatusCode::INTERNAL_SERVER_ERROR, "Cache purge failed")
            .with_detail(e.to_string())
            .with_instance(&instance)
    })?;

    if deleted == 0 {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Ok(StatusCode::OK.into_response())
    }
}

fn parse_chc(body: &Bytes, instance: &str) -> Result<ContentHostingConfiguration, Problem> {
    serde_json::from_slice(body).map_err(|e| {
        Problem::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Invalid content hosting configuration",
        )
        .with_detail(e.to_string())
        .with_instance(instance)
    })
}

fn store_problem(error: StoreError, instance: &str) -> Problem {
    match error {
        StoreError::Invalid { param, reason } => Problem::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Invalid content hosting configuration",
        )
        .with_detail(format!("{}: {}", param, reason))
        .with_invalid_param(param, Some(reason))
        .with_instance(instance),
        other => Problem::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Control store failure",
        )
        .with_detail(other.to_string())
        .with_instance(instance),
    }
}
