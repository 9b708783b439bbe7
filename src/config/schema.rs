//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the agent.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the sidecar agent.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AgentConfig {
    /// Mesh-wide proxy settings.
    pub mesh: MeshConfig,

    /// Identity of the local node.
    pub node: NodeConfig,

    /// Restart retry and suppression policy.
    pub retry: RetryConfig,

    /// Proxy process settings.
    pub runner: RunnerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Mutual-TLS policy applied to the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthPolicy {
    /// Plaintext between proxies.
    #[default]
    None,
    /// Proxies authenticate each other with mounted certificates.
    MutualTls,
}

/// Mesh-wide proxy settings. Never mutated by the agent, except for
/// telemetry address normalization before the watcher starts.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Grace period for an outgoing proxy generation to drain, in seconds.
    pub drain_secs: u64,

    /// Additional time before an outgoing generation is forcibly stopped, in seconds.
    pub parent_shutdown_secs: u64,

    /// Service cluster reported by the proxy.
    pub service_cluster: String,

    /// Mutual-TLS policy.
    pub auth_policy: AuthPolicy,

    /// Directory holding the mounted certificate material.
    pub auth_certs_path: String,

    /// Statsd sink (`host:port`); empty disables telemetry.
    pub statsd_udp_address: String,

    /// Discovery service address used by the rendered bootstrap.
    pub discovery_address: String,

    /// Proxy admin port.
    pub proxy_admin_port: u16,
}

impl MeshConfig {
    pub fn drain_duration(&self) -> Duration {
        Duration::from_secs(self.drain_secs)
    }

    pub fn parent_shutdown_duration(&self) -> Duration {
        Duration::from_secs(self.parent_shutdown_secs)
    }

    pub fn mutual_tls(&self) -> bool {
        self.auth_policy == AuthPolicy::MutualTls
    }
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            drain_secs: 45,
            parent_shutdown_secs: 60,
            service_cluster: "istio-proxy".to_string(),
            auth_policy: AuthPolicy::None,
            auth_certs_path: "/etc/certs".to_string(),
            statsd_udp_address: String::new(),
            discovery_address: "istio-pilot:8080".to_string(),
            proxy_admin_port: 15000,
        }
    }
}

/// Local node identity.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node IP address, also used as the proxy's service-node name.
    pub ip_address: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            ip_address: "127.0.0.1".to_string(),
        }
    }
}

/// Restart retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries allowed after a failed launch before giving up.
    pub max_retries: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub initial_interval_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_interval_ms: u64,

    /// Skip launching an epoch when the desired config equals the latest one.
    pub skip_unchanged: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_interval_ms: 200,
            max_interval_ms: 30_000,
            skip_unchanged: true,
        }
    }
}

/// Verbosity handed to the proxy process through `-l`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyLogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl ProxyLogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyLogLevel::Trace => "trace",
            ProxyLogLevel::Debug => "debug",
            ProxyLogLevel::Info => "info",
            ProxyLogLevel::Warn => "warn",
            ProxyLogLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for ProxyLogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(ProxyLogLevel::Trace),
            "debug" => Ok(ProxyLogLevel::Debug),
            "info" => Ok(ProxyLogLevel::Info),
            "warn" => Ok(ProxyLogLevel::Warn),
            "error" => Ok(ProxyLogLevel::Error),
            other => Err(format!("unknown proxy log level '{}'", other)),
        }
    }
}

/// Proxy process configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Path to the proxy binary.
    pub binary_path: String,

    /// Directory holding per-epoch configuration files.
    pub config_dir: String,

    /// File name prefix for per-epoch configuration files.
    pub file_prefix: String,

    /// How long a new process must stay up before it counts as running.
    pub startup_grace_ms: u64,

    /// Optional proxy verbosity.
    pub proxy_log_level: Option<ProxyLogLevel>,
}

impl RunnerConfig {
    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            binary_path: "/usr/local/bin/envoy".to_string(),
            config_dir: "/etc/envoy".to_string(),
            file_prefix: "envoy".to_string(),
            startup_grace_ms: 1_000,
            proxy_log_level: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:15090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.mesh.drain_duration(), Duration::from_secs(45));
        assert_eq!(config.mesh.parent_shutdown_duration(), Duration::from_secs(60));
        assert!(!config.mesh.mutual_tls());
        assert_eq!(config.retry.max_retries, 10);
        assert!(config.retry.skip_unchanged);
        assert_eq!(config.runner.file_prefix, "envoy");
        assert!(config.runner.proxy_log_level.is_none());
    }

    #[test]
    fn test_partial_toml() {
        let config: AgentConfig = toml::from_str(
            r#"
            [mesh]
            auth_policy = "mutual_tls"
            drain_secs = 5

            [runner]
            proxy_log_level = "debug"
            "#,
        )
        .unwrap();

        assert!(config.mesh.mutual_tls());
        assert_eq!(config.mesh.drain_secs, 5);
        assert_eq!(config.mesh.parent_shutdown_secs, 60);
        assert_eq!(config.runner.proxy_log_level, Some(ProxyLogLevel::Debug));
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!("TRACE".parse::<ProxyLogLevel>(), Ok(ProxyLogLevel::Trace));
        assert!("verbose".parse::<ProxyLogLevel>().is_err());
    }
}
