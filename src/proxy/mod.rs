//! Desired proxy state.
//!
//! # Data Flow
//! ```text
//! AgentConfig.mesh + node IP
//!     → context.rs (ProxyContext, telemetry address normalized once)
//!     → generate.rs (ConfigGenerator renders a ProxyConfig)
//!     → watcher stamps the certificate fingerprint under mutual TLS
//!     → restart agent decides whether the config warrants a new epoch
//! ```
//!
//! # Design Decisions
//! - Rendering is an external concern behind `ConfigGenerator`
//! - `ProxyConfig` is opaque to the agent apart from equality

pub mod context;
pub mod generate;

pub use context::ProxyContext;
pub use generate::{BootstrapGenerator, ConfigGenerator, GenerateError, ProxyConfig};
