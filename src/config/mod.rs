//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AgentConfig (validated, immutable)
//!     → mesh section copied into the ProxyContext handed to the watcher
//!     → retry/runner sections handed to the restart agent and runner
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the node restarts to pick up changes
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AgentConfig, AuthPolicy, MeshConfig, NodeConfig, ObservabilityConfig, ProxyLogLevel,
    RetryConfig, RunnerConfig,
};
pub use validation::{validate_config, ValidationError};
