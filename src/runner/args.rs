//! Epoch file layout and proxy command-line construction.

use std::path::{Path, PathBuf};

use crate::agent::Epoch;
use crate::config::{MeshConfig, ProxyLogLevel};

/// `<config_dir>/<prefix>-rev<epoch>.json`
pub fn config_file(config_dir: &Path, prefix: &str, epoch: Epoch) -> PathBuf {
    config_dir.join(format!("{}-rev{}.json", prefix, epoch))
}

/// Arguments for one proxy epoch.
///
/// `node` is the service-node identity (the node IP).
pub fn proxy_args(
    config_path: &Path,
    epoch: Epoch,
    mesh: &MeshConfig,
    node: &str,
    log_level: Option<ProxyLogLevel>,
) -> Vec<String> {
    let mut args = vec![
        "-c".to_string(),
        config_path.display().to_string(),
        "--restart-epoch".to_string(),
        epoch.to_string(),
        "--drain-time-s".to_string(),
        mesh.drain_duration().as_secs().to_string(),
        "--parent-shutdown-time-s".to_string(),
        mesh.parent_shutdown_duration().as_secs().to_string(),
        "--service-cluster".to_string(),
        mesh.service_cluster.clone(),
        "--service-node".to_string(),
        node.to_string(),
    ];

    if let Some(level) = log_level {
        args.push("-l".to_string());
        args.push(level.as_str().to_string());
    }

    args
}
