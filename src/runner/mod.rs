//! Proxy process supervision.
//!
//! # Data Flow
//! ```text
//! restart agent launches epoch N with config C
//!     → args.rs (epoch file path, command-line arguments)
//!     → envoy.rs writes C to <config_dir>/<prefix>-rev<N>.json
//!     → envoy.rs spawns the proxy, stdout/stderr inherited
//!     → waits on: process exit | startup grace (→ running) | abort
//!     → outcome reported back to the agent
//!
//! Epoch N superseded and terminated:
//!     → cleanup removes <prefix>-rev<N>.json
//! ```
//!
//! # Design Decisions
//! - The agent never touches processes directly; it only talks to this trait
//! - Epoch files use disjoint paths, so concurrent epochs need no locking
//! - Cleanup and panic never return errors to the agent

pub mod args;
pub mod envoy;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::agent::{Epoch, EpochContext};
use crate::proxy::ProxyConfig;

pub use envoy::EnvoyRunner;

/// Ways an epoch's process can end other than a clean exit.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to write config file {path}: {source}")]
    WriteConfig {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting for proxy process: {0}")]
    Wait(#[source] std::io::Error),

    #[error("proxy exited with status {}", exit_status(.code))]
    Exited { code: Option<i32> },

    #[error("epoch aborted")]
    Aborted,
}

fn exit_status(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
}

impl RunError {
    pub fn is_abort(&self) -> bool {
        matches!(self, RunError::Aborted)
    }
}

/// Starts, stops and cleans up epochs of the supervised proxy.
#[async_trait]
pub trait ProcessRunner: Send + Sync + 'static {
    /// Run one epoch until its process exits or the epoch is aborted.
    ///
    /// Implementations call `ctx.mark_running()` once the process is serving.
    async fn run(&self, config: Arc<ProxyConfig>, ctx: EpochContext) -> Result<(), RunError>;

    /// Discard the epoch's on-disk artifacts. Failures are logged, not returned.
    fn cleanup(&self, epoch: Epoch);

    /// The proxy cannot be started at all; terminate the node.
    fn panic(&self, reason: &str);
}
