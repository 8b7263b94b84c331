//! M3 data model
//!
//! This module defines the ContentHostingConfiguration resource tree carried
//! over the M3 interface. Field names follow the 3GPP JSON wire format
//! (camelCase).

use serde::{Deserialize, Serialize};

/// The only ingest protocol the Application Server can serve
pub const HTTP_PULL_INGEST: &str = "urn:3gpp:5gms:content-protocol:http-pull-ingest";

/// Content hosting configuration of one provisioning session
///
/// Describes one ingest origin and one or more distribution fronts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContentHostingConfiguration {
    /// Human-readable name of the configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// The content ingest origin
    pub ingest_configuration: IngestConfiguration,

    /// The downstream-facing distribution fronts, in order
    pub distribution_configurations: Vec<DistributionConfiguration>,
}

/// Ingest origin description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IngestConfiguration {
    /// Whether content is pulled from the origin
    pub pull: bool,

    /// Ingest protocol URN
    pub protocol: String,

    /// Origin base URL content is pulled from
    pub base_url: String,
}

/// One downstream-facing distribution front
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DistributionConfiguration {
    /// Primary hostname clients use
    pub canonical_domain_name: String,

    /// Additional hostname serving the same content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_name_alias: Option<String>,

    /// Distribution base URL; its path component is the M4d path prefix
    pub base_url: String,

    /// Certificate id for TLS distribution, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_id: Option<String>,

    /// Path rewrite rules applied before proxying upstream, in order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_rewrite_rules: Option<Vec<PathRewriteRule>>,
}

/// One path rewrite rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PathRewriteRule {
    /// Pattern matched against the request path
    pub request_path_pattern: String,

    /// Replacement path
    pub mapped_path: String,
}

impl ContentHostingConfiguration {
    /// Validate the ingest configuration
    ///
    /// Only pull ingest over `http-pull-ingest` is supported.
    ///
    /// # Returns
    ///
    /// Returns `Err(reason)` describing the violation.
    pub fn validate_ingest(&self) -> Result<(), String> {
        if !self.ingest_configuration.pull {
            return Err("only pull ingest is supported".to_string());
        }
        if self.ingest_configuration.protocol != HTTP_PULL_INGEST {
            return Err(format!(
                "unsupported ingest protocol {}, expected {}",
                self.ingest_configuration.protocol, HTTP_PULL_INGEST
            ));
        }
        Ok(())
    }

    /// Iterate over all certificate ids referenced by distribution configurations
    pub fn certificate_ids(&self) -> impl Iterator<Item = &str> {
        self.distribution_configurations
            .iter()
            .filter_map(|dc| dc.certificate_id.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chc(pull: bool, protocol: &str) -> ContentHostingConfiguration {
        ContentHostingConfiguration {
            name: None,
            ingest_configuration: IngestConfiguration {
                pull,
                protocol: protocol.to_string(),
                base_url: "http://origin/".to_string(),
            },
            distribution_configurations: vec![],
        }
    }

    #[test]
    fn test_validate_ingest() {
        // Pull ingest over the supported protocol is accepted
        assert!(chc(true, HTTP_PULL_INGEST).validate_ingest().is_ok());

        // Push ingest is rejected
        assert!(chc(false, HTTP_PULL_INGEST).validate_ingest().is_err());

        // Unknown protocols are rejected
        assert!(chc(true, "urn:example:push").validate_ingest().is_err());
    }

    #[test]
    fn test_wire_format() {
        // Field names must match the 3GPP camelCase wire format
        let json = r#"{
            "ingestConfiguration": {
                "pull": true,
                "protocol": "urn:3gpp:5gms:content-protocol:http-pull-ingest",
                "baseUrl": "http://origin/"
            },
            "distributionConfigurations": [{
                "canonicalDomainName": "example.com",
                "baseUrl": "https://example.com/m4d/ps1/",
                "certificateId": "cert-A",
                "pathRewriteRules": [
                    {"requestPathPattern": "^/a/", "mappedPath": "/b/"}
                ]
            }]
        }"#;

        let chc: ContentHostingConfiguration = serde_json::from_str(json).unwrap();
        assert!(chc.validate_ingest().is_ok());
        assert_eq!(chc.distribution_configurations.len(), 1);
        let dc = &chc.distribution_configurations[0];
        assert_eq!(dc.canonical_domain_name, "example.com");
        assert_eq!(dc.certificate_id.as_deref(), Some("cert-A"));
        assert_eq!(chc.certificate_ids().collect::<Vec<_>>(), vec!["cert-A"]);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let json = r#"{
            "ingestConfiguration": {
                "pull": true,
                "protocol": "urn:3gpp:5gms:content-protocol:http-pull-ingest",
                "baseUrl": "http://origin/",
                "bogus": 1
            },
            "distributionConfigurations": []
        }"#;
        assert!(serde_json::from_str::<ContentHostingConfiguration>(json).is_err());
    }
}
