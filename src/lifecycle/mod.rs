//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Build watcher (registers handlers) → Run
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop reloading → Drain proxy epochs → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Force a reload
//! ```
//!
//! # Design Decisions
//! - The stop signal is level-triggered so late subscribers cannot miss it
//! - Shutdown waits for the running proxy to drain; the drain timers bound it

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
