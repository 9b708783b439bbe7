//! Node-local proxy context.

use crate::config::{AgentConfig, MeshConfig};

/// Everything config generation needs to know about this node.
#[derive(Debug, Clone)]
pub struct ProxyContext {
    /// Local node IP address; doubles as the proxy's service-node name.
    pub ip_address: String,

    pub mesh: MeshConfig,
}

impl ProxyContext {
    pub fn new(ip_address: impl Into<String>, mesh: MeshConfig) -> Self {
        Self {
            ip_address: ip_address.into(),
            mesh,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(config.node.ip_address.clone(), config.mesh.clone())
    }

    /// Rewrite the statsd sink as a resolved `ip:port`.
    ///
    /// Telemetry is optional: on any resolution failure the address is
    /// cleared and a warning logged.
    pub async fn normalize_telemetry_address(&mut self) {
        if self.mesh.statsd_udp_address.is_empty() {
            return;
        }

        match resolve_statsd_addr(&self.mesh.statsd_udp_address).await {
            Ok(addr) => self.mesh.statsd_udp_address = addr,
            Err(e) => {
                tracing::warn!(
                    address = %self.mesh.statsd_udp_address,
                    error = %e,
                    "Error resolving statsd address; clearing to prevent bad config"
                );
                self.mesh.statsd_udp_address.clear();
            }
        }
    }
}

/// Resolve `host:port` to the first `ip:port` the host maps to.
pub async fn resolve_statsd_addr(address: &str) -> std::io::Result<String> {
    let (host, port) = address.rsplit_once(':').ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("missing port in address '{}'", address),
        )
    })?;
    let port: u16 = port.parse().map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid port in address '{}': {}", address, e),
        )
    })?;
    let host = host.trim_start_matches('[').trim_end_matches(']');

    let resolved = tokio::net::lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no addresses found for '{}'", host),
            )
        })?;

    Ok(resolved.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_literal_address() {
        let addr = resolve_statsd_addr("127.0.0.1:8125").await.unwrap();
        assert_eq!(addr, "127.0.0.1:8125");
    }

    #[tokio::test]
    async fn test_resolve_requires_port() {
        assert!(resolve_statsd_addr("127.0.0.1").await.is_err());
        assert!(resolve_statsd_addr("127.0.0.1:statsd").await.is_err());
    }

    #[tokio::test]
    async fn test_normalize_clears_bad_address() {
        let mut mesh = MeshConfig::default();
        mesh.statsd_udp_address = "statsd-without-port".into();
        let mut ctx = ProxyContext::new("10.1.1.1", mesh);

        ctx.normalize_telemetry_address().await;
        assert!(ctx.mesh.statsd_udp_address.is_empty());
    }

    #[tokio::test]
    async fn test_normalize_keeps_resolved_address() {
        let mut mesh = MeshConfig::default();
        mesh.statsd_udp_address = "localhost:8125".into();
        let mut ctx = ProxyContext::new("10.1.1.1", mesh);

        ctx.normalize_telemetry_address().await;
        assert!(ctx.mesh.statsd_udp_address.ends_with(":8125"));
        assert!(!ctx.mesh.statsd_udp_address.starts_with("localhost"));
    }
}
