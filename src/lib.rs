//! Sidecar proxy lifecycle agent library.

pub mod agent;
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod proxy;
pub mod resilience;
pub mod runner;
pub mod watcher;

pub use agent::{AgentHandle, AgentSettings, Epoch, RestartAgent};
pub use config::AgentConfig;
pub use lifecycle::Shutdown;
pub use proxy::{ConfigGenerator, ProxyConfig, ProxyContext};
pub use runner::{EnvoyRunner, ProcessRunner};
pub use watcher::ReloadWatcher;
