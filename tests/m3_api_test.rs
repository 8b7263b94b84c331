//! Integration tests for the M3 interface
//!
//! Drives the full axum router in memory over tempdir-backed stores and
//! checks the status-code matrix the M3 specification mandates.

use std::fs;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tower::ServiceExt;

use gms_app_server::api::{build_router, AppState};
use gms_app_server::config::AppConfig;
use gms_app_server::proxy::NginxWebProxy;
use gms_app_server::store::ControlStore;

struct TestHarness {
    app: Router,
    _certs: TempDir,
    cache: TempDir,
    out: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let certs = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();

        let mut config = AppConfig::default();
        config.certificates_cache_dir = certs.path().to_path_buf();
        config.proxy_cache_dir = Some(cache.path().to_path_buf());
        config.proxy_config_path = out.path().join("rt_5gms_as.conf");

        let config = Arc::new(ArcSwap::from_pointee(config));
        let store = ControlStore::new(certs.path()).unwrap();
        let state = AppState {
            config: config.clone(),
            store: Arc::new(Mutex::new(store)),
            proxy: Arc::new(NginxWebProxy::new(config)),
        };

        Self {
            app: build_router(state),
            _certs: certs,
            cache,
            out,
        }
    }

    async fn request(
        &self,
        method: &str,
        uri: &str,
        content_type: Option<&str>,
        body: &[u8],
    ) -> axum::http::Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(ct) = content_type {
            builder = builder.header(header::CONTENT_TYPE, ct);
        }
        let request = builder.body(Body::from(body.to_vec())).unwrap();
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn post_certificate(&self, id: &str, pem: &[u8]) -> axum::http::Response<Body> {
        self.request(
            "POST",
            &format!("/3gpp-m3/v1/certificates/{}", id),
            Some("application/x-pem-file"),
            pem,
        )
        .await
    }

    async fn post_chc(&self, psid: &str, body: &str) -> axum::http::Response<Body> {
        self.request(
            "POST",
            &format!("/3gpp-m3/v1/content-hosting-configurations/{}", psid),
            Some("application/json"),
            body.as_bytes(),
        )
        .await
    }

    fn config_text(&self) -> String {
        fs::read_to_string(self.out.path().join("rt_5gms_as.conf")).unwrap()
    }
}

fn sample_chc(cert: Option<&str>) -> String {
    let certificate = match cert {
        Some(id) => format!(r#","certificateId": "{}""#, id),
        None => String::new(),
    };
    format!(
        r#"{{
            "ingestConfiguration": {{
                "pull": true,
                "protocol": "urn:3gpp:5gms:content-protocol:http-pull-ingest",
                "baseUrl": "http://origin/"
            }},
            "distributionConfigurations": [{{
                "canonicalDomainName": "example.com",
                "baseUrl": "https://example.com/m4d/ps1/"{certificate}
            }}]
        }}"#
    )
}

async fn body_json(response: axum::http::Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_happy_path_create() {
    let harness = TestHarness::new();

    // Certificate first, then a configuration referencing it
    let response = harness.post_certificate("cert-A", b"-----BEGIN CERTIFICATE-----").await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        response.headers()[header::LOCATION],
        "/3gpp-m3/v1/certificates/cert-A"
    );

    let response = harness.post_chc("ps1", &sample_chc(Some("cert-A"))).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    // The generated configuration reflects the new distribution
    let text = harness.config_text();
    assert!(text.contains("listen 443 ssl;"));
    assert!(text.contains("server_name example.com;"));
    assert!(text.contains("location ~ ^/m4d/ps1/ {"));
    assert!(text.contains("proxy_pass http://origin;"));
    assert!(text.contains("proxy_cache_key \"ps1:u=$uri\";"));
}

#[tokio::test]
async fn test_duplicate_session_rejected() {
    let harness = TestHarness::new();

    let response = harness.post_chc("ps1", &sample_chc(None)).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    // A second POST on the same provisioning session is not allowed
    let response = harness.post_chc("ps1", &sample_chc(None)).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/problem+json"
    );
}

#[tokio::test]
async fn test_certificate_in_use() {
    let harness = TestHarness::new();
    harness.post_certificate("cert-A", b"pem").await;
    harness.post_chc("ps1", &sample_chc(Some("cert-A"))).await;

    let response = harness
        .request("DELETE", "/3gpp-m3/v1/certificates/cert-A", None, b"")
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let problem = body_json(response).await;
    assert_eq!(problem["status"], 409);
    assert_eq!(problem["instance"], "/certificates/cert-A");
}

#[tokio::test]
async fn test_no_op_update_skips_regeneration() {
    let harness = TestHarness::new();
    harness.post_chc("ps1", &sample_chc(None)).await;

    // Scribble over the generated file; an unchanged PUT must not rewrite it
    let conf = harness.out.path().join("rt_5gms_as.conf");
    fs::write(&conf, b"sentinel").unwrap();

    let response = harness
        .request(
            "PUT",
            "/3gpp-m3/v1/content-hosting-configurations/ps1",
            Some("application/json"),
            sample_chc(None).as_bytes(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(fs::read(&conf).unwrap(), b"sentinel");

    // A real change regenerates
    let changed = sample_chc(None).replace("example.com", "other.com");
    let response = harness
        .request(
            "PUT",
            "/3gpp-m3/v1/content-hosting-configurations/ps1",
            Some("application/json"),
            changed.as_bytes(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(harness.config_text().contains("other.com"));
}

#[tokio::test]
async fn test_certificate_update_outcomes() {
    let harness = TestHarness::new();

    // Updating an unknown certificate is a 404
    let response = harness
        .request(
            "PUT",
            "/3gpp-m3/v1/certificates/cert-A",
            Some("application/x-pem-file"),
            b"pem",
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    harness.post_certificate("cert-A", b"pem").await;

    // Unchanged bytes: 204
    let response = harness
        .request(
            "PUT",
            "/3gpp-m3/v1/certificates/cert-A",
            Some("application/x-pem-file"),
            b"pem",
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // New bytes: 200
    let response = harness
        .request(
            "PUT",
            "/3gpp-m3/v1/certificates/cert-A",
            Some("application/x-pem-file"),
            b"pem-2",
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Duplicate POST: 405
    let response = harness.post_certificate("cert-A", b"pem-3").await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_unsupported_media_types() {
    let harness = TestHarness::new();

    let response = harness
        .request(
            "POST",
            "/3gpp-m3/v1/certificates/cert-A",
            Some("text/plain"),
            b"pem",
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let response = harness
        .request(
            "POST",
            "/3gpp-m3/v1/content-hosting-configurations/ps1",
            Some("text/plain"),
            sample_chc(None).as_bytes(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_semantically_invalid_chc() {
    let harness = TestHarness::new();

    // Unknown certificate reference
    let response = harness.post_chc("ps1", &sample_chc(Some("missing-cert"))).await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let problem = body_json(response).await;
    assert_eq!(problem["invalidParams"][0]["param"], "certificateId");

    // Push ingest
    let pushed = sample_chc(None).replace(r#""pull": true"#, r#""pull": false"#);
    let response = harness.post_chc("ps1", &pushed).await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_listings() {
    let harness = TestHarness::new();
    harness.post_certificate("cert-A", b"pem").await;
    harness.post_chc("ps1", &sample_chc(Some("cert-A"))).await;

    let response = harness
        .request("GET", "/3gpp-m3/v1/certificates", None, b"")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let list = body_json(response).await;
    assert_eq!(list, serde_json::json!(["/3gpp-m3/v1/certificates/cert-A"]));

    let response = harness
        .request("GET", "/3gpp-m3/v1/content-hosting-configurations", None, b"")
        .await;
    let list = body_json(response).await;
    assert_eq!(
        list,
        serde_json::json!(["/3gpp-m3/v1/content-hosting-configurations/ps1"])
    );
}

#[tokio::test]
async fn test_purge_by_regex() {
    let harness = TestHarness::new();
    harness.post_chc("ps1", &sample_chc(None)).await;

    // Synthesize proxy cache entries for two sessions
    let cache = harness.cache.path();
    fs::write(cache.join("0001"), b"KEY: ps1:u=/a/x\nbody").unwrap();
    fs::write(cache.join("0002"), b"KEY: ps1:u=/a/y\nbody").unwrap();
    fs::write(cache.join("0003"), b"KEY: ps2:u=/a/x\nbody").unwrap();

    let response = harness
        .request(
            "POST",
            "/3gpp-m3/v1/content-hosting-configurations/ps1/purge",
            Some("application/x-www-form-urlencoded"),
            b"pattern=%5E%2Fa%2F.%2A",
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    assert!(!cache.join("0001").exists());
    assert!(!cache.join("0002").exists());
    assert!(cache.join("0003").exists(), "Other sessions must be retained");

    // A second purge finds nothing left
    let response = harness
        .request(
            "POST",
            "/3gpp-m3/v1/content-hosting-configurations/ps1/purge",
            None,
            b"",
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_purge_error_cases() {
    let harness = TestHarness::new();
    harness.post_chc("ps1", &sample_chc(None)).await;

    // Unknown session
    let response = harness
        .request(
            "POST",
            "/3gpp-m3/v1/content-hosting-configurations/nope/purge",
            None,
            b"",
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Invalid regex names the offending parameter
    let response = harness
        .request(
            "POST",
            "/3gpp-m3/v1/content-hosting-configurations/ps1/purge",
            Some("application/x-www-form-urlencoded"),
            b"pattern=%28unclosed",
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let problem = body_json(response).await;
    assert_eq!(problem["invalidParams"][0]["param"], "pattern");

    // Wrong media type on a non-empty body
    let response = harness
        .request(
            "POST",
            "/3gpp-m3/v1/content-hosting-configurations/ps1/purge",
            Some("application/json"),
            b"{\"pattern\": \".*\"}",
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_delete_session_purges_its_cache() {
    let harness = TestHarness::new();
    harness.post_chc("ps1", &sample_chc(None)).await;

    let cache = harness.cache.path();
    fs::write(cache.join("0001"), b"KEY: ps1:u=/a/x\nbody").unwrap();
    fs::write(cache.join("0002"), b"KEY: ps2:u=/a/x\nbody").unwrap();

    let response = harness
        .request(
            "DELETE",
            "/3gpp-m3/v1/content-hosting-configurations/ps1",
            None,
            b"",
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // The deleted session's cache entries are gone, others survive
    assert!(!cache.join("0001").exists());
    assert!(cache.join("0002").exists());

    // Deleting again is a 404
    let response = harness
        .request(
            "DELETE",
            "/3gpp-m3/v1/content-hosting-configurations/ps1",
            None,
            b"",
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
