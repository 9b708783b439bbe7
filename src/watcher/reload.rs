//! The reload watcher: change events in, desired configs out.
//!
//! # Responsibilities
//! - Register the ingress with every change source at construction
//! - Start the restart agent and, under mutual TLS, the certificate watcher
//! - Prime the proxy with one reload before any event arrives
//! - Regenerate and submit a config for every ingress event
//! - Join background tasks once the stop signal fires

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::agent::{AgentHandle, AgentSettings, RestartAgent};
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::proxy::{ConfigGenerator, ProxyContext};
use crate::runner::ProcessRunner;
use crate::watcher::certs::{fingerprint_cert_dir, CertWatcher};
use crate::watcher::registry::{
    change_channel, ChangeEvent, ChangeSender, ConfigKind, ConfigStore, Controller, RegistryError,
};

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("failed to register change handler: {0}")]
    Registry(#[from] RegistryError),
}

pub struct ReloadWatcher<R: ProcessRunner, G: ConfigGenerator> {
    agent: RestartAgent<R>,
    reloader: Reloader<G>,
    ingress_tx: ChangeSender,
    ingress_rx: mpsc::UnboundedReceiver<ChangeEvent>,
}

impl<R: ProcessRunner, G: ConfigGenerator> ReloadWatcher<R, G> {
    /// Build a watcher and its restart agent. Nothing reloads until [`run`](Self::run).
    ///
    /// `config_store` is optional; without it only registry membership
    /// changes trigger reloads.
    pub async fn new(
        controller: &dyn Controller,
        config_store: Option<&dyn ConfigStore>,
        mut context: ProxyContext,
        generator: G,
        runner: Arc<R>,
        settings: AgentSettings,
    ) -> Result<Self, WatcherError> {
        tracing::info!(address = %context.ip_address, "Local instance address");

        context.normalize_telemetry_address().await;

        let (agent, handle) = RestartAgent::new(runner, settings);
        let (ingress_tx, ingress_rx) = change_channel();

        controller.append_service_handler(ingress_tx.clone())?;
        controller.append_instance_handler(ingress_tx.clone())?;

        if let Some(store) = config_store {
            store.register_event_handler(ConfigKind::RouteRule, ingress_tx.clone());
            store.register_event_handler(ConfigKind::DestinationPolicy, ingress_tx.clone());
        }

        Ok(Self {
            agent,
            reloader: Reloader {
                handle,
                generator,
                context,
            },
            ingress_tx,
            ingress_rx,
        })
    }

    /// Sender for ad-hoc reload requests (e.g. SIGHUP).
    pub fn sink(&self) -> ChangeSender {
        self.ingress_tx.clone()
    }

    pub fn context(&self) -> &ProxyContext {
        &self.reloader.context
    }

    /// Watch until `stop` fires, then wait for the agent to drain.
    pub async fn run(self, mut stop: ShutdownSignal) {
        let Self {
            agent,
            reloader,
            ingress_tx,
            mut ingress_rx,
        } = self;

        let mut tasks = JoinSet::new();
        tasks.spawn(agent.run(stop.clone()));

        // kickstart the proxy with partial state (in case there are no notifications coming)
        reloader.reload("prime");

        let mesh = &reloader.context.mesh;
        if mesh.mutual_tls() {
            let certs = CertWatcher::new(&mesh.auth_certs_path, ingress_tx.clone());
            tasks.spawn(certs.run(stop.clone()));
        }

        loop {
            tokio::select! {
                _ = stop.recv() => break,
                Some(event) = ingress_rx.recv() => {
                    tracing::debug!(event = ?event, "Change notification");
                    reloader.reload(event.trigger());
                }
            }
        }

        tracing::info!("Reload watcher stopping");
        drop(ingress_rx);

        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                tracing::error!(error = %e, "Background task failed");
            }
        }
    }
}

struct Reloader<G: ConfigGenerator> {
    handle: AgentHandle,
    generator: G,
    context: ProxyContext,
}

impl<G: ConfigGenerator> Reloader<G> {
    /// Regenerate the desired config and hand it to the agent.
    ///
    /// Errors leave the running proxy untouched.
    fn reload(&self, trigger: &'static str) {
        let mut config = match self.generator.generate(&self.context) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(
                    trigger,
                    error = %e,
                    "Config generation failed; keeping current proxy"
                );
                return;
            }
        };

        let mesh = &self.context.mesh;
        if mesh.mutual_tls() {
            match fingerprint_cert_dir(Path::new(&mesh.auth_certs_path)) {
                Ok(hash) => config.hash = Some(hash),
                Err(e) => {
                    tracing::error!(
                        trigger,
                        error = %e,
                        "Certificate fingerprint failed; keeping current proxy"
                    );
                    return;
                }
            }
        }

        metrics::record_reload(trigger);
        tracing::debug!(trigger, hash = ?config.hash_hex(), "Submitting proxy config");
        self.handle.schedule_config_update(config);
    }
}
