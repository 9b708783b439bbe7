//! Certificate fingerprinting and directory monitoring.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::lifecycle::ShutdownSignal;
use crate::watcher::registry::{ChangeEvent, ChangeSender};

/// Files that make up the mounted mutual-TLS identity, in hashing order.
pub const CERT_FILES: [&str; 3] = ["cert-chain.pem", "key.pem", "root-cert.pem"];

#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// SHA-256 over the certificate files in `dir`.
///
/// A missing file is skipped (it contributes nothing); other read errors fail.
pub fn fingerprint_cert_dir(dir: &Path) -> Result<Vec<u8>, FingerprintError> {
    let mut hasher = Sha256::new();

    for name in CERT_FILES {
        let path = dir.join(name);
        match std::fs::read(&path) {
            Ok(bytes) => hasher.update(&bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(
                    path = %path.display(),
                    "Certificate file missing; skipped in fingerprint"
                );
            }
            Err(source) => {
                return Err(FingerprintError::Read {
                    path: path.display().to_string(),
                    source,
                })
            }
        }
    }

    Ok(hasher.finalize().to_vec())
}

/// Watches the certificate directory and reports changes on the ingress.
pub struct CertWatcher {
    path: PathBuf,
    sink: ChangeSender,
}

impl CertWatcher {
    pub fn new(path: impl Into<PathBuf>, sink: ChangeSender) -> Self {
        Self {
            path: path.into(),
            sink,
        }
    }

    /// Start the filesystem watcher. It stops when the returned handle drops.
    pub fn watch(&self) -> Result<RecommendedWatcher, notify::Error> {
        let sink = self.sink.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove() {
                        tracing::info!(paths = ?event.paths, "Certificate change detected");
                        sink.send(ChangeEvent::Certificates);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Certificate watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Certificate watcher started");
        Ok(watcher)
    }

    /// Watch until `stop` fires. Setup failures are logged; rotation is then unsupported.
    pub async fn run(self, mut stop: ShutdownSignal) {
        let _watcher = match self.watch() {
            Ok(watcher) => watcher,
            Err(e) => {
                tracing::error!(
                    path = ?self.path,
                    error = %e,
                    "Failed to watch certificate directory"
                );
                return;
            }
        };

        stop.recv().await;
        tracing::debug!(path = ?self.path, "Certificate watcher stopped");
    }
}
