//! Epoch-based hot-restart agent.
//!
//! # Data Flow
//! ```text
//! AgentHandle::schedule_config_update(config)    (any task)
//!     → event queue
//!     → RestartAgent::run (single coordinating loop)
//!         → launch task per epoch: ProcessRunner::run(config, EpochContext)
//!         ← EpochRunning / EpochExited posted back onto the queue
//!         → previous epoch drained, later killed if it outlives the deadline
//!         → ProcessRunner::cleanup(epoch) once the epoch is gone
//! ```
//!
//! # Design Decisions
//! - Epoch numbers and the desired config are owned by the loop alone
//! - Updates apply strictly in queue order; the last one wins
//! - At most one epoch is starting; a newer config aborts it

pub mod epoch;
pub mod restart;

pub use epoch::{AbortSignal, Directive, Epoch, EpochContext, EpochControl, EpochState};
pub use restart::{AgentHandle, AgentSettings, RestartAgent};
