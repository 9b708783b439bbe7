//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Epoch launch fails:
//!     → retries.rs (consume budget, arm a generation-tagged retry)
//!     → backoff.rs (exponential delay with jitter)
//!     → restart agent relaunches the desired config when the timer fires
//! ```
//!
//! # Design Decisions
//! - Budget is bounded; exhaustion is reported, never retried silently
//! - Jittered backoff keeps a crash-looping proxy from spinning the node

pub mod backoff;
pub mod retries;

pub use backoff::calculate_backoff;
pub use retries::{RetryDecision, RetryPolicy, RetryState};
