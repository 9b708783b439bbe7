//! Epoch identity, lifecycle states and per-epoch signalling.

use std::fmt;

use tokio::sync::watch;

/// One generation of the proxy process. Strictly increasing, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(pub u64);

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Epoch {
    fn from(n: u64) -> Self {
        Self(n)
    }
}

/// Lifecycle of a single epoch, as tracked by the restart agent.
///
/// ```text
/// Pending → Starting → Running → Draining → Terminated → CleanedUp
///              └──→ Aborted ─────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochState {
    Pending,
    Starting,
    Running,
    Draining,
    Aborted,
    Terminated,
    CleanedUp,
}

impl EpochState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpochState::Pending => "pending",
            EpochState::Starting => "starting",
            EpochState::Running => "running",
            EpochState::Draining => "draining",
            EpochState::Aborted => "aborted",
            EpochState::Terminated => "terminated",
            EpochState::CleanedUp => "cleaned_up",
        }
    }
}

impl fmt::Display for EpochState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the agent currently wants from an epoch's process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Run,
    Drain,
    Abort,
}

/// Agent-side handle used to steer one epoch.
#[derive(Debug)]
pub struct EpochControl {
    tx: watch::Sender<Directive>,
}

impl EpochControl {
    /// The epoch has been superseded and should wind down on its own.
    pub fn drain(&self) {
        self.tx.send_if_modified(|d| {
            if *d == Directive::Run {
                *d = Directive::Drain;
                true
            } else {
                false
            }
        });
    }

    /// Terminate the epoch's process now. One-shot; repeated calls are no-ops.
    pub fn abort(&self) {
        self.tx.send_if_modified(|d| {
            if *d != Directive::Abort {
                *d = Directive::Abort;
                true
            } else {
                false
            }
        });
    }
}

/// Runner-side view of the agent's directives.
///
/// Dropping the [`EpochControl`] counts as an abort: an epoch nobody
/// supervises must not keep running.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<Directive>,
}

impl AbortSignal {
    /// Resolves once the epoch must terminate.
    pub async fn aborted(&mut self) {
        let _ = self.rx.wait_for(|d| *d == Directive::Abort).await;
    }

    /// Resolves once the epoch has been superseded (drain or abort).
    pub async fn draining(&mut self) {
        let _ = self.rx.wait_for(|d| *d != Directive::Run).await;
    }

    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow() == Directive::Abort || self.rx.has_changed().is_err()
    }
}

type ReadyHook = Box<dyn FnOnce() + Send>;

/// Everything a runner receives alongside the config for one epoch.
pub struct EpochContext {
    pub epoch: Epoch,
    pub abort: AbortSignal,
    ready: Option<ReadyHook>,
}

impl EpochContext {
    /// Create a context and the control that steers it.
    pub fn new(epoch: Epoch) -> (Self, EpochControl) {
        let (tx, rx) = watch::channel(Directive::Run);
        (
            Self {
                epoch,
                abort: AbortSignal { rx },
                ready: None,
            },
            EpochControl { tx },
        )
    }

    /// Invoke `hook` the first time the runner reports the epoch as running.
    pub fn on_running(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.ready = Some(Box::new(hook));
        self
    }

    /// Report that the process is up and serving. Only the first call counts.
    pub fn mark_running(&mut self) {
        if let Some(hook) = self.ready.take() {
            hook();
        }
    }
}

impl fmt::Debug for EpochContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EpochContext")
            .field("epoch", &self.epoch)
            .field("ready_pending", &self.ready.is_some())
            .finish()
    }
}
