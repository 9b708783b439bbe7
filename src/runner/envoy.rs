//! Envoy process runner.
//!
//! # Responsibilities
//! - Write the epoch's configuration file
//! - Spawn the proxy binary with hot-restart arguments
//! - Report readiness once the process survives the startup grace period
//! - Kill the process when the epoch is aborted
//! - Remove the epoch's configuration file on cleanup

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;

use crate::agent::{Epoch, EpochContext};
use crate::config::{MeshConfig, RunnerConfig};
use crate::proxy::ProxyConfig;
use crate::runner::args::{config_file, proxy_args};
use crate::runner::{ProcessRunner, RunError};

pub struct EnvoyRunner {
    mesh: MeshConfig,
    node: String,
    config: RunnerConfig,
}

impl EnvoyRunner {
    /// `node` is the service-node identity passed to every epoch.
    pub fn new(mesh: MeshConfig, node: impl Into<String>, config: RunnerConfig) -> Self {
        Self {
            mesh,
            node: node.into(),
            config,
        }
    }

    pub fn config_path(&self, epoch: Epoch) -> PathBuf {
        config_file(Path::new(&self.config.config_dir), &self.config.file_prefix, epoch)
    }
}

#[async_trait]
impl ProcessRunner for EnvoyRunner {
    async fn run(&self, config: Arc<ProxyConfig>, mut ctx: EpochContext) -> Result<(), RunError> {
        let epoch = ctx.epoch;

        let path = self.config_path(epoch);
        config
            .write_file(&path)
            .map_err(|source| RunError::WriteConfig {
                path: path.display().to_string(),
                source,
            })?;

        let args = proxy_args(
            &path,
            epoch,
            &self.mesh,
            &self.node,
            self.config.proxy_log_level,
        );
        tracing::debug!(
            epoch = %epoch,
            binary = %self.config.binary_path,
            args = ?args,
            "Proxy command"
        );

        if ctx.abort.is_aborted() {
            return Err(RunError::Aborted);
        }

        let mut child = Command::new(&self.config.binary_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunError::Spawn {
                binary: self.config.binary_path.clone(),
                source,
            })?;

        tracing::info!(epoch = %epoch, pid = child.id(), "Proxy process started");

        let grace = tokio::time::sleep(self.config.startup_grace());
        tokio::pin!(grace);
        let mut running = false;
        let mut drain = ctx.abort.clone();
        let mut draining = false;

        loop {
            tokio::select! {
                status = child.wait() => {
                    return exit_result(epoch, status);
                }
                _ = &mut grace, if !running => {
                    running = true;
                    tracing::info!(epoch = %epoch, "Proxy epoch is running");
                    ctx.mark_running();
                }
                _ = drain.draining(), if !draining => {
                    // hot restart drains this epoch's listeners; it exits on its own
                    draining = true;
                    tracing::info!(epoch = %epoch, "Proxy epoch draining");
                }
                _ = ctx.abort.aborted() => {
                    tracing::warn!(epoch = %epoch, "Aborting epoch");
                    if let Err(e) = child.kill().await {
                        tracing::warn!(epoch = %epoch, error = %e, "Killing epoch caused an error");
                    }
                    return Err(RunError::Aborted);
                }
            }
        }
    }

    fn cleanup(&self, epoch: Epoch) {
        let path = self.config_path(epoch);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(epoch = %epoch, path = %path.display(), "Removed epoch config")
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                epoch = %epoch,
                path = %path.display(),
                error = %e,
                "Failed to delete config file"
            ),
        }
    }

    fn panic(&self, reason: &str) {
        tracing::error!(reason = %reason, "Cannot start the proxy with the desired configuration");
        std::process::exit(1);
    }
}

fn exit_result(epoch: Epoch, status: std::io::Result<ExitStatus>) -> Result<(), RunError> {
    match status {
        Ok(status) if status.success() => {
            tracing::info!(epoch = %epoch, "Proxy process exited");
            Ok(())
        }
        Ok(status) => {
            tracing::warn!(epoch = %epoch, status = %status, "Proxy process failed");
            Err(RunError::Exited {
                code: status.code(),
            })
        }
        Err(e) => Err(RunError::Wait(e)),
    }
}
