//! M3 problem responses
//!
//! All M3 failures are reported as RFC 7807 problem details with media type
//! `application/problem+json`.

use axum::response::{IntoResponse, Response};
use http::{header, StatusCode};
use serde::Serialize;

/// Path prefix of every M3 resource
pub const M3_PREFIX: &str = "/3gpp-m3/v1";

/// One invalid request parameter
#[derive(Debug, Clone, Serialize)]
pub struct InvalidParam {
    /// Offending parameter name
    pub param: String,

    /// Why the parameter was rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// RFC 7807 problem details body
#[derive(Debug, Clone, Serialize)]
pub struct Problem {
    /// Problem type URI
    #[serde(rename = "type")]
    pub problem_type: String,

    /// Short human-readable summary
    pub title: String,

    /// HTTP status code
    pub status: u16,

    /// Human-readable explanation specific to this occurrence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// Resource the problem occurred on, relative to the M3 prefix
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,

    /// Parameters that failed validation
    #[serde(rename = "invalidParams", skip_serializing_if = "Option::is_none")]
    pub invalid_params: Option<Vec<InvalidParam>>,
}

impl Problem {
    /// Create a problem with the given status and title
    pub fn new(status: StatusCode, title: impl Into<String>) -> Self {
        Self {
            problem_type: M3_PREFIX.to_string(),
            title: title.into(),
            status: status.as_u16(),
            detail: None,
            instance: None,
            invalid_params: None,
        }
    }

    /// Attach an occurrence-specific explanation
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Attach the resource path, stripping the M3 prefix when present
    pub fn with_instance(mut self, path: &str) -> Self {
        let instance = path.strip_prefix(M3_PREFIX).unwrap_or(path);
        self.instance = Some(instance.to_string());
        self
    }

    /// Attach one invalid parameter
    pub fn with_invalid_param(mut self, param: impl Into<String>, reason: Option<String>) -> Self {
        self.invalid_params
            .get_or_insert_with(Vec::new)
            .push(InvalidParam {
                param: param.into(),
                reason,
            });
        self
    }
}

impl IntoResponse for Problem {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::to_vec(&self).unwrap_or_default();
        (
            status,
            [(header::CONTENT_TYPE, "application/problem+json")],
            body,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_prefix_stripped() {
        let problem = Problem::new(StatusCode::NOT_FOUND, "Not found")
            .with_instance("/3gpp-m3/v1/certificates/cert-A");
        assert_eq!(problem.instance.as_deref(), Some("/certificates/cert-A"));
    }

    #[test]
    fn test_serialized_shape() {
        let problem = Problem::new(StatusCode::UNPROCESSABLE_ENTITY, "Bad pattern")
            .with_invalid_param("pattern", Some("unclosed group".to_string()));
        let json = serde_json::to_value(&problem).unwrap();

        assert_eq!(json["type"], "/3gpp-m3/v1");
        assert_eq!(json["status"], 422);
        assert_eq!(json["invalidParams"][0]["param"], "pattern");

        // Absent fields are omitted entirely
        assert!(json.get("detail").is_none());
    }
}
