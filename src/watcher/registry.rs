//! Change sources and the typed ingress they push onto.
//!
//! Registries never call back into the watcher. Each registered source
//! receives a [`ChangeSender`] and pushes [`ChangeEvent`]s; only the
//! watcher's own task consumes them.

use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Add,
    Update,
    Delete,
}

/// Configuration kinds the watcher reloads on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKind {
    RouteRule,
    DestinationPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Service {
        name: String,
        kind: EventKind,
    },
    Instance {
        service: String,
        address: String,
        kind: EventKind,
    },
    Config {
        config_kind: ConfigKind,
        name: String,
        kind: EventKind,
    },
    /// Certificate material changed on disk.
    Certificates,
    /// Operator-requested reload (SIGHUP).
    Manual,
}

impl ChangeEvent {
    /// Metric label for the reload this event triggers.
    pub fn trigger(&self) -> &'static str {
        match self {
            ChangeEvent::Service { .. } => "service",
            ChangeEvent::Instance { .. } => "instance",
            ChangeEvent::Config {
                config_kind: ConfigKind::RouteRule,
                ..
            } => "route_rule",
            ChangeEvent::Config {
                config_kind: ConfigKind::DestinationPolicy,
                ..
            } => "destination_policy",
            ChangeEvent::Certificates => "certificates",
            ChangeEvent::Manual => "manual",
        }
    }
}

/// Producer half of the watcher ingress. Clone freely; sending never blocks.
#[derive(Debug, Clone)]
pub struct ChangeSender {
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

impl ChangeSender {
    /// Push an event. Returns false once the watcher has gone away.
    pub fn send(&self, event: ChangeEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

pub(crate) fn change_channel() -> (ChangeSender, mpsc::UnboundedReceiver<ChangeEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChangeSender { tx }, rx)
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("handler registration rejected: {0}")]
    Rejected(String),

    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

/// Service registry membership notifications.
pub trait Controller: Send + Sync {
    fn append_service_handler(&self, sink: ChangeSender) -> Result<(), RegistryError>;

    fn append_instance_handler(&self, sink: ChangeSender) -> Result<(), RegistryError>;
}

/// Routing and policy configuration notifications.
pub trait ConfigStore: Send + Sync {
    fn register_event_handler(&self, kind: ConfigKind, sink: ChangeSender);
}

/// A registry with nothing in it: accepts handlers and never notifies.
#[derive(Debug, Clone, Default)]
pub struct StaticController;

impl Controller for StaticController {
    fn append_service_handler(&self, _sink: ChangeSender) -> Result<(), RegistryError> {
        Ok(())
    }

    fn append_instance_handler(&self, _sink: ChangeSender) -> Result<(), RegistryError> {
        Ok(())
    }
}
