//! Rendered proxy configuration and the generation seam.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde_json::{json, Value};
use thiserror::Error;

use crate::proxy::context::ProxyContext;

/// Errors produced while rendering a proxy configuration.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("invalid proxy context: {0}")]
    InvalidContext(String),

    #[error("render failed: {0}")]
    Render(String),
}

/// A rendered proxy configuration.
///
/// Immutable once produced. Equality covers both the rendered document and
/// the certificate fingerprint, so a certificate rotation never compares
/// equal to the previous config even when the document is unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyConfig {
    pub body: Value,

    /// Certificate fingerprint; set only under mutual TLS.
    pub hash: Option<Vec<u8>>,
}

impl ProxyConfig {
    pub fn new(body: Value) -> Self {
        Self { body, hash: None }
    }

    pub fn with_hash(mut self, hash: Vec<u8>) -> Self {
        self.hash = Some(hash);
        self
    }

    /// Serialize the document to `path`, replacing any previous file.
    pub fn write_file(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(path)?;
        serde_json::to_writer_pretty(&mut file, &self.body)?;
        file.write_all(b"\n")?;
        file.sync_all()
    }

    /// Short hex form of the fingerprint for logs.
    pub fn hash_hex(&self) -> Option<String> {
        self.hash
            .as_ref()
            .map(|h| h.iter().take(8).map(|b| format!("{:02x}", b)).collect())
    }
}

/// Renders the desired proxy state for a node.
///
/// Must be callable from any task; implementations hold no per-call state.
pub trait ConfigGenerator: Send + Sync + 'static {
    fn generate(&self, ctx: &ProxyContext) -> Result<ProxyConfig, GenerateError>;
}

impl<F> ConfigGenerator for F
where
    F: Fn(&ProxyContext) -> Result<ProxyConfig, GenerateError> + Send + Sync + 'static,
{
    fn generate(&self, ctx: &ProxyContext) -> Result<ProxyConfig, GenerateError> {
        self(ctx)
    }
}

/// Minimal bootstrap: admin listener, discovery cluster and optional statsd sink.
#[derive(Debug, Clone, Default)]
pub struct BootstrapGenerator;

impl ConfigGenerator for BootstrapGenerator {
    fn generate(&self, ctx: &ProxyContext) -> Result<ProxyConfig, GenerateError> {
        let mesh = &ctx.mesh;

        let (discovery_host, discovery_port) =
            split_host_port(&mesh.discovery_address).ok_or_else(|| {
                GenerateError::InvalidContext(format!(
                    "discovery address '{}' is not host:port",
                    mesh.discovery_address
                ))
            })?;

        let mut body = json!({
            "node": {
                "id": ctx.ip_address,
                "cluster": mesh.service_cluster,
            },
            "admin": {
                "access_log_path": "/dev/stdout",
                "address": {
                    "socket_address": {
                        "address": "127.0.0.1",
                        "port_value": mesh.proxy_admin_port
                    }
                }
            },
            "static_resources": {
                "clusters": [{
                    "name": "discovery",
                    "connect_timeout": "1s",
                    "type": "STRICT_DNS",
                    "load_assignment": {
                        "cluster_name": "discovery",
                        "endpoints": [{
                            "lb_endpoints": [{
                                "endpoint": {
                                    "address": {
                                        "socket_address": {
                                            "address": discovery_host,
                                            "port_value": discovery_port
                                        }
                                    }
                                }
                            }]
                        }]
                    }
                }]
            },
            "dynamic_resources": {
                "lds_config": { "ads": {} },
                "cds_config": { "ads": {} },
                "ads_config": {
                    "api_type": "GRPC",
                    "grpc_services": [{ "envoy_grpc": { "cluster_name": "discovery" } }]
                }
            }
        });

        if !mesh.statsd_udp_address.is_empty() {
            let (host, port) = split_host_port(&mesh.statsd_udp_address).ok_or_else(|| {
                GenerateError::Render(format!(
                    "statsd address '{}' is not ip:port",
                    mesh.statsd_udp_address
                ))
            })?;
            body["stats_sinks"] = json!([{
                "name": "envoy.stat_sinks.statsd",
                "typed_config": {
                    "@type": "type.googleapis.com/envoy.config.metrics.v3.StatsdSink",
                    "address": {
                        "socket_address": {
                            "protocol": "UDP",
                            "address": host,
                            "port_value": port
                        }
                    }
                }
            }]);
        }

        Ok(ProxyConfig::new(body))
    }
}

/// Split `host:port`, unwrapping a bracketed IPv6 host.
fn split_host_port(address: &str) -> Option<(&str, u16)> {
    let (host, port) = address.rsplit_once(':')?;
    let port = port.parse().ok()?;
    Some((host.trim_start_matches('[').trim_end_matches(']'), port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MeshConfig;

    #[test]
    fn test_hash_participates_in_equality() {
        let a = ProxyConfig::new(json!({"k": 1}));
        let b = a.clone().with_hash(vec![1, 2, 3]);
        let c = a.clone().with_hash(vec![1, 2, 4]);

        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_eq!(b.hash_hex().as_deref(), Some("010203"));
    }

    #[test]
    fn test_write_file_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/envoy-rev0.json");

        ProxyConfig::new(json!({"admin": {}})).write_file(&path).unwrap();

        let written: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, json!({"admin": {}}));
    }

    #[test]
    fn test_bootstrap_generator() {
        let mut mesh = MeshConfig::default();
        mesh.statsd_udp_address = "10.0.0.9:8125".into();
        let ctx = ProxyContext::new("10.0.0.1", mesh);

        let config = BootstrapGenerator.generate(&ctx).unwrap();
        assert_eq!(config.body["node"]["id"], "10.0.0.1");
        assert_eq!(config.body["node"]["cluster"], "istio-proxy");
        let sink = &config.body["stats_sinks"][0]["typed_config"]["address"]["socket_address"];
        assert_eq!(sink["address"], "10.0.0.9");
        assert_eq!(sink["port_value"], 8125);
        assert!(config.hash.is_none());
    }

    #[test]
    fn test_bootstrap_unwraps_ipv6_statsd_host() {
        let mut mesh = MeshConfig::default();
        mesh.statsd_udp_address = "[::1]:8125".into();
        let ctx = ProxyContext::new("10.0.0.1", mesh);

        let config = BootstrapGenerator.generate(&ctx).unwrap();
        let sink = &config.body["stats_sinks"][0]["typed_config"]["address"]["socket_address"];
        assert_eq!(sink["address"], "::1");
        assert_eq!(sink["port_value"], 8125);
    }

    #[test]
    fn test_bootstrap_rejects_bad_discovery_address() {
        let mut mesh = MeshConfig::default();
        mesh.discovery_address = "pilot".into();
        let ctx = ProxyContext::new("10.0.0.1", mesh);

        assert!(matches!(
            BootstrapGenerator.generate(&ctx),
            Err(GenerateError::InvalidContext(_))
        ));
    }
}
