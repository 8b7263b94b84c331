//! Web proxy configuration translator
//!
//! Translates the control store contents into the reverse-proxy
//! configuration text. The translation goes through a typed configuration
//! tree (`ServerConfig`/`LocationConfig`): distribution configurations are
//! first collected into server blocks keyed by hostname and certificate,
//! equivalent server blocks are then merged, and only then is the final text
//! rendered. Generation is all-or-nothing: any validation failure aborts
//! before a single byte is produced.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::PathBuf;

use crate::common::{AppError, Result};
use crate::config::AppConfig;
use crate::store::ControlStore;

use super::rewrite::{normalize_rewrite_rule, RewriteRule};

/// One `location` block: a path prefix proxied to a downstream origin
#[derive(Debug, Clone)]
pub struct LocationConfig {
    /// M4d path prefix, always `/`-delimited on both ends
    pub path_prefix: String,
    /// Downstream origin URL, no trailing slash
    pub downstream_prefix_url: String,
    /// Owning provisioning session, embedded in the cache key
    pub provisioning_session: String,
    /// Normalized rewrite rules, in order
    pub rewrite_rules: Vec<RewriteRule>,
}

impl LocationConfig {
    /// Equality key for server merging: the path prefix and the multiset of
    /// rewrite rules. The downstream origin and provisioning session do not
    /// participate.
    fn merge_key(&self) -> (String, Vec<(String, String)>) {
        let mut rules: Vec<(String, String)> = self
            .rewrite_rules
            .iter()
            .map(|r| (r.pattern.clone(), r.replacement.clone()))
            .collect();
        rules.sort();
        (self.path_prefix.clone(), rules)
    }
}

/// One `server` block
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Hostnames this server answers for
    pub hostnames: BTreeSet<String>,
    /// Listen port
    pub port: u16,
    /// Whether this server terminates TLS
    pub tls: bool,
    /// Certificate (and key) file when TLS is enabled
    pub certificate_file: Option<PathBuf>,
    /// Whether responses are cached on disk
    pub use_cache: bool,
    /// Location blocks, in order of appearance
    pub locations: Vec<LocationConfig>,
}

impl ServerConfig {
    /// Order-insensitive multiset of location equality keys
    fn location_keys(&self) -> Vec<(String, Vec<(String, String)>)> {
        let mut keys: Vec<_> = self.locations.iter().map(LocationConfig::merge_key).collect();
        keys.sort();
        keys
    }

    /// Whether two servers can be merged into one block
    fn compatible(&self, other: &Self) -> bool {
        self.tls == other.tls
            && self.certificate_file == other.certificate_file
            && self.port == other.port
            && self.use_cache == other.use_cache
            && self.location_keys() == other.location_keys()
    }
}

/// Extract the path component of a URL
///
/// Query string and fragment are dropped. A URL without a path yields `""`.
fn url_path_component(url: &str) -> &str {
    let after_scheme = match url.find("://") {
        Some(i) => &url[i + 3..],
        None => url,
    };
    let path = match after_scheme.find('/') {
        Some(i) => &after_scheme[i..],
        None => return "",
    };
    let end = path.find(['?', '#']).unwrap_or(path.len());
    &path[..end]
}

/// Force a path to start and end with `/`
fn slash_delimited(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 2);
    if !path.starts_with('/') {
        out.push('/');
    }
    out.push_str(path);
    if !out.ends_with('/') {
        out.push('/');
    }
    out
}

/// Build the server blocks for the current control store contents
///
/// Fails when any content-hosting configuration has an unsupported ingest,
/// references a certificate without a cached file, or carries a rewrite rule
/// that does not compile.
pub fn build_server_configs(store: &ControlStore, config: &AppConfig) -> Result<Vec<ServerConfig>> {
    let use_cache = config.proxy_cache_dir.is_some();
    let mut servers: Vec<ServerConfig> = Vec::new();

    for psid in store.psids() {
        let Some(chc) = store.get_chc(&psid) else {
            continue;
        };

        chc.validate_ingest().map_err(|reason| {
            AppError::Config(format!("provisioning session {}: {}", psid, reason))
        })?;

        let downstream_origin = chc
            .ingest_configuration
            .base_url
            .trim_end_matches('/')
            .to_string();

        for dc in &chc.distribution_configurations {
            let path_prefix = slash_delimited(url_path_component(&dc.base_url));

            let certificate_file = match &dc.certificate_id {
                Some(id) => Some(store.cert_path(id).map(PathBuf::from).ok_or_else(|| {
                    AppError::Certificate(format!(
                        "provisioning session {} references unknown certificate {}",
                        psid, id
                    ))
                })?),
                None => None,
            };

            let mut location = LocationConfig {
                path_prefix,
                downstream_prefix_url: downstream_origin.clone(),
                provisioning_session: psid.clone(),
                rewrite_rules: Vec::new(),
            };
            if let Some(rules) = &dc.path_rewrite_rules {
                for rule in rules {
                    let normalized =
                        normalize_rewrite_rule(&rule.request_path_pattern, &rule.mapped_path)
                            .map_err(|reason| {
                                AppError::RewriteRule(format!(
                                    "{} in provisioning session {}: {}",
                                    rule.request_path_pattern, psid, reason
                                ))
                            })?;
                    location.rewrite_rules.push(normalized);
                }
            }

            let tls = certificate_file.is_some();
            let port = if tls { config.https_port } else { config.http_port };

            let mut hostnames = vec![dc.canonical_domain_name.clone()];
            if let Some(alias) = &dc.domain_name_alias {
                hostnames.push(alias.clone());
            }
            for hostname in hostnames {
                upsert_server(
                    &mut servers,
                    hostname,
                    port,
                    tls,
                    certificate_file.clone(),
                    use_cache,
                    location.clone(),
                );
            }
        }
    }

    Ok(merge_server_configs(servers))
}

/// Append a location to the server for `(hostname, certificate_file)`,
/// creating the server on first sight
fn upsert_server(
    servers: &mut Vec<ServerConfig>,
    hostname: String,
    port: u16,
    tls: bool,
    certificate_file: Option<PathBuf>,
    use_cache: bool,
    location: LocationConfig,
) {
    if let Some(server) = servers
        .iter_mut()
        .find(|s| s.hostnames.contains(&hostname) && s.certificate_file == certificate_file)
    {
        server.locations.push(location);
        return;
    }
    let mut hostnames = BTreeSet::new();
    hostnames.insert(hostname);
    servers.push(ServerConfig {
        hostnames,
        port,
        tls,
        certificate_file,
        use_cache,
        locations: vec![location],
    });
}

/// Merge equivalent server blocks until a fixpoint is reached
///
/// Two servers merge when they share TLS status, certificate file, port,
/// cache flag and an identical location set; merging unites their hostname
/// sets.
pub fn merge_server_configs(mut servers: Vec<ServerConfig>) -> Vec<ServerConfig> {
    loop {
        let mut merged_any = false;

        'outer: for i in 0..servers.len() {
            for j in (i + 1)..servers.len() {
                if servers[i].compatible(&servers[j]) {
                    let other = servers.remove(j);
                    servers[i].hostnames.extend(other.hostnames);
                    merged_any = true;
                    break 'outer;
                }
            }
        }

        if !merged_any {
            return servers;
        }
    }
}

/// Render the full proxy configuration text
pub fn render(servers: &[ServerConfig], config: &AppConfig) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "worker_processes auto;");
    let _ = writeln!(out, "error_log {} error;", config.error_log_path.display());
    let _ = writeln!(out, "pid {};", config.pid_path.display());
    let _ = writeln!(out);
    let _ = writeln!(out, "events {{");
    let _ = writeln!(out, "}}");
    let _ = writeln!(out);
    let _ = writeln!(out, "http {{");
    let _ = writeln!(out, "  default_type application/octet-stream;");
    let _ = writeln!(out, "  access_log {};", config.access_log_path.display());
    let _ = writeln!(out, "  client_body_temp_path {};", config.client_body_tmp.display());
    let _ = writeln!(out, "  proxy_temp_path {};", config.proxy_temp_path.display());
    let _ = writeln!(out, "  fastcgi_temp_path {};", config.fastcgi_temp_path.display());
    let _ = writeln!(out, "  uwsgi_temp_path {};", config.uwsgi_temp_path.display());
    let _ = writeln!(out, "  scgi_temp_path {};", config.scgi_temp_path.display());
    if let Some(cache_dir) = &config.proxy_cache_dir {
        let _ = writeln!(
            out,
            "  proxy_cache_path {} levels=1:2 use_temp_path=on keys_zone=cacheone:10m;",
            cache_dir.display()
        );
    }

    for server in servers {
        let _ = writeln!(out);
        render_server(&mut out, server);
    }

    let _ = writeln!(out, "}}");
    out
}

fn render_server(out: &mut String, server: &ServerConfig) {
    let ssl = if server.tls { " ssl" } else { "" };
    let hostnames: Vec<&str> = server.hostnames.iter().map(String::as_str).collect();

    let _ = writeln!(out, "  server {{");
    let _ = writeln!(out, "    listen {}{};", server.port, ssl);
    let _ = writeln!(out, "    listen [::]:{}{};", server.port, ssl);
    let _ = writeln!(out, "    server_name {};", hostnames.join(" "));
    if let Some(certificate) = &server.certificate_file {
        let _ = writeln!(out, "    ssl_certificate {};", certificate.display());
        let _ = writeln!(out, "    ssl_certificate_key {};", certificate.display());
    }
    if server.use_cache {
        let _ = writeln!(out, "    proxy_cache cacheone;");
    }
    let _ = writeln!(out, "    location / {{");
    let _ = writeln!(out, "      return 404;");
    let _ = writeln!(out, "    }}");

    for location in &server.locations {
        let _ = writeln!(out, "    location ~ ^{} {{", location.path_prefix);
        for rule in &location.rewrite_rules {
            let _ = writeln!(out, "      rewrite \"{}\" \"{}\" break;", rule.pattern, rule.replacement);
        }
        let _ = writeln!(
            out,
            "      proxy_cache_key \"{}:u=$uri\";",
            location.provisioning_session
        );
        let _ = writeln!(out, "      proxy_pass {};", location.downstream_prefix_url);
        let _ = writeln!(out, "    }}");
    }

    let _ = writeln!(out, "    error_page 404 /404.html;");
    let _ = writeln!(out, "    error_page 500 502 503 504 /50x.html;");
    let _ = writeln!(out, "  }}");
}

/// Build, merge and render in one step
pub fn generate(store: &ControlStore, config: &AppConfig) -> Result<String> {
    let servers = build_server_configs(store, config)?;
    Ok(render(&servers, config))
}
