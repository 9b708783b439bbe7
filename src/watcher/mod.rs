//! Reload watcher subsystem.
//!
//! # Data Flow
//! ```text
//! service / instance handlers ─┐
//! route-rule / policy handlers ├→ ChangeSender → ingress (one queue)
//! certificate watcher ─────────┤                    │
//! SIGHUP ──────────────────────┘                    ▼
//!                                 reload.rs: generate → fingerprint (mTLS)
//!                                                    │
//!                                                    ▼
//!                                 AgentHandle::schedule_config_update
//! ```
//!
//! # Design Decisions
//! - Sources push typed events; nothing calls back into the watcher
//! - No coalescing here; redundant configs are the agent's to suppress
//! - Background tasks are joined on shutdown

pub mod certs;
pub mod registry;
pub mod reload;

pub use certs::{fingerprint_cert_dir, CertWatcher, FingerprintError};
pub use registry::{
    ChangeEvent, ChangeSender, ConfigKind, ConfigStore, Controller, EventKind, RegistryError,
    StaticController,
};
pub use reload::{ReloadWatcher, WatcherError};
