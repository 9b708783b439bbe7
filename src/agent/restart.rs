//! The restart agent: single owner of epoch state.
//!
//! # Responsibilities
//! - Accept desired-config updates from any task via [`AgentHandle`]
//! - Launch a new epoch per meaningful update, preempting a still-starting one
//! - Drain the previous epoch once its replacement is running
//! - Retry failed launches with backoff; panic if no epoch ever ran
//! - Clean up every epoch exactly once, whatever its ending
//!
//! # Design Decisions
//! - Every transition happens inside `run`; launch tasks only post events
//! - A running epoch is never aborted because its replacement failed
//! - Drain deadline = drain duration + parent-shutdown duration, then kill

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::agent::epoch::{Epoch, EpochContext, EpochControl, EpochState};
use crate::config::AgentConfig;
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::proxy::ProxyConfig;
use crate::resilience::{RetryDecision, RetryPolicy, RetryState};
use crate::runner::{ProcessRunner, RunError};

/// Tunables for the restart agent.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub retry: RetryPolicy,

    /// Do not launch when the desired config equals the latest epoch's config.
    pub skip_unchanged: bool,

    pub drain: Duration,
    pub parent_shutdown: Duration,
}

impl AgentSettings {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            retry: RetryPolicy::from(&config.retry),
            skip_unchanged: config.retry.skip_unchanged,
            drain: config.mesh.drain_duration(),
            parent_shutdown: config.mesh.parent_shutdown_duration(),
        }
    }

    fn drain_deadline(&self) -> Duration {
        self.drain + self.parent_shutdown
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default())
    }
}

#[derive(Debug)]
pub(crate) enum AgentEvent {
    ConfigUpdate(ProxyConfig),
    EpochRunning(Epoch),
    EpochExited {
        epoch: Epoch,
        result: Result<(), RunError>,
    },
    DrainDeadline(Epoch),
    RetryDue(u64),
}

/// Cheap, clonable entry point for submitting desired configs.
#[derive(Clone)]
pub struct AgentHandle {
    tx: mpsc::UnboundedSender<AgentEvent>,
}

impl AgentHandle {
    /// Enqueue a desired config. Never blocks; the latest update wins.
    pub fn schedule_config_update(&self, config: ProxyConfig) {
        if self.tx.send(AgentEvent::ConfigUpdate(config)).is_err() {
            tracing::warn!("Restart agent is not running; dropping config update");
        }
    }
}

struct EpochRecord {
    config: Arc<ProxyConfig>,
    state: EpochState,
    control: EpochControl,
}

pub struct RestartAgent<R: ProcessRunner> {
    runner: Arc<R>,
    settings: AgentSettings,
    events_tx: mpsc::UnboundedSender<AgentEvent>,
    events_rx: mpsc::UnboundedReceiver<AgentEvent>,

    desired: Option<Arc<ProxyConfig>>,
    /// The desired config has not been acted on yet.
    dirty: bool,
    epochs: BTreeMap<Epoch, EpochRecord>,
    next_epoch: u64,
    starting: Option<Epoch>,
    current: Option<Epoch>,
    retry: RetryState,
    /// Some epoch has reached Running at least once.
    ever_running: bool,
    stopping: bool,
    forced: bool,
}

impl<R: ProcessRunner> RestartAgent<R> {
    /// Create an agent and the handle used to feed it.
    pub fn new(runner: Arc<R>, settings: AgentSettings) -> (Self, AgentHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let handle = AgentHandle {
            tx: events_tx.clone(),
        };

        let agent = Self {
            runner,
            retry: RetryState::new(settings.retry),
            settings,
            events_tx,
            events_rx,
            desired: None,
            dirty: false,
            epochs: BTreeMap::new(),
            next_epoch: 0,
            starting: None,
            current: None,
            ever_running: false,
            stopping: false,
            forced: false,
        };

        (agent, handle)
    }

    /// Run the coordinating loop.
    ///
    /// Returns after `stop` fires (or the runner panicked) and every epoch
    /// has terminated and been cleaned up. A forced stop kills every epoch
    /// instead of waiting out the drain.
    pub async fn run(mut self, mut stop: ShutdownSignal) {
        tracing::info!("Restart agent started");
        let mut force = stop.clone();

        loop {
            if self.stopping && self.epochs.is_empty() {
                break;
            }

            tokio::select! {
                _ = stop.recv(), if !self.stopping => self.begin_stop(),
                _ = force.forced(), if !self.forced => self.force_stop(),
                event = self.events_rx.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
            }
        }

        tracing::info!("Restart agent stopped");
    }

    fn handle_event(&mut self, event: AgentEvent) {
        match event {
            AgentEvent::ConfigUpdate(config) => self.on_config_update(config),
            AgentEvent::EpochRunning(epoch) => self.on_epoch_running(epoch),
            AgentEvent::EpochExited { epoch, result } => self.on_epoch_exited(epoch, result),
            AgentEvent::DrainDeadline(epoch) => self.on_drain_deadline(epoch),
            AgentEvent::RetryDue(generation) => {
                if self.retry.fire(generation) {
                    self.reconcile();
                }
            }
        }
    }

    fn on_config_update(&mut self, config: ProxyConfig) {
        if self.stopping {
            tracing::debug!("Ignoring config update during shutdown");
            return;
        }

        if self.desired.as_deref() != Some(&config) {
            tracing::debug!(hash = ?config.hash_hex(), "New desired proxy config");
            self.retry.reset();
        }
        self.desired = Some(Arc::new(config));
        self.dirty = true;
        self.reconcile();
    }

    fn on_epoch_running(&mut self, epoch: Epoch) {
        let Some(record) = self.epochs.get_mut(&epoch) else {
            return;
        };
        if record.state != EpochState::Starting {
            tracing::debug!(
                epoch = %epoch,
                state = %record.state,
                "Ignoring late readiness report"
            );
            return;
        }

        record.state = EpochState::Running;
        if self.starting == Some(epoch) {
            self.starting = None;
        }
        self.retry.reset();
        self.ever_running = true;
        metrics::record_current_epoch(epoch);
        tracing::info!(epoch = %epoch, "Epoch running");

        if let Some(previous) = self.current.replace(epoch) {
            self.begin_drain(previous);
        }

        self.reconcile();
    }

    fn on_epoch_exited(&mut self, epoch: Epoch, result: Result<(), RunError>) {
        let Some(mut record) = self.epochs.remove(&epoch) else {
            tracing::warn!(epoch = %epoch, "Exit reported for unknown epoch");
            return;
        };

        let failure = match record.state {
            EpochState::Starting => {
                self.starting = None;
                match &result {
                    Ok(()) => tracing::warn!(epoch = %epoch, "Epoch exited before it was running"),
                    Err(e) => tracing::warn!(epoch = %epoch, error = %e, "Epoch failed to start"),
                }
                metrics::record_epoch_exit("start_failed");
                Some(Failure::Start)
            }
            EpochState::Running => {
                self.current = None;
                match &result {
                    Ok(()) => tracing::warn!(epoch = %epoch, "Serving epoch exited"),
                    Err(e) => tracing::warn!(epoch = %epoch, error = %e, "Serving epoch failed"),
                }
                metrics::record_epoch_exit("crashed");
                Some(Failure::Serving)
            }
            EpochState::Draining => {
                let killed = result.as_ref().is_err_and(RunError::is_abort);
                tracing::info!(epoch = %epoch, killed, "Epoch terminated");
                metrics::record_epoch_exit("terminated");
                None
            }
            EpochState::Aborted => {
                tracing::info!(epoch = %epoch, "Epoch aborted");
                metrics::record_epoch_exit("aborted");
                None
            }
            state @ (EpochState::Pending | EpochState::Terminated | EpochState::CleanedUp) => {
                tracing::warn!(epoch = %epoch, state = %state, "Unexpected epoch exit");
                None
            }
        };
        record.state = EpochState::Terminated;
        tracing::debug!(epoch = %epoch, state = %record.state, "Cleaning up epoch");

        self.runner.cleanup(epoch);
        record.state = EpochState::CleanedUp;
        tracing::debug!(epoch = %epoch, state = %record.state, "Epoch cleaned up");

        if let Some(failure) = failure {
            self.on_launch_failure(failure);
        }
        self.reconcile();
    }

    fn on_drain_deadline(&mut self, epoch: Epoch) {
        if let Some(record) = self.epochs.get(&epoch) {
            if record.state == EpochState::Draining {
                tracing::warn!(epoch = %epoch, "Drained epoch still alive; terminating");
                record.control.abort();
            }
        }
    }

    fn on_launch_failure(&mut self, failure: Failure) {
        if self.stopping {
            return;
        }
        self.dirty = true;

        // a serving epoch went down: relaunching it gets a full budget
        if failure == Failure::Serving && !self.retry.is_pending() {
            self.retry.reset();
        }

        match self.retry.record_failure() {
            RetryDecision::Retry {
                attempt,
                delay,
                generation,
            } => {
                tracing::info!(attempt, delay = ?delay, "Scheduling proxy restart");
                metrics::record_retry();
                let tx = self.events_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(AgentEvent::RetryDue(generation));
                });
            }
            RetryDecision::Scheduled => {
                tracing::debug!("Restart already scheduled");
            }
            RetryDecision::Exhausted => match self.current {
                Some(current) => {
                    tracing::error!(
                        epoch = %current,
                        attempts = self.retry.attempts(),
                        "Giving up on desired config; keeping the running epoch"
                    );
                    self.retry.abandon();
                }
                None if self.ever_running => {
                    tracing::error!(
                        attempts = self.retry.attempts(),
                        "Giving up on desired config; waiting for a new one"
                    );
                    self.retry.abandon();
                }
                None => {
                    tracing::error!(
                        attempts = self.retry.attempts(),
                        "Retry budget exhausted with no running epoch"
                    );
                    self.abort_all();
                    self.stopping = true;
                    self.runner
                        .panic("cannot start the proxy with the desired configuration");
                }
            },
        }
    }

    /// Launch the desired config if it has not been acted on and nothing blocks it.
    fn reconcile(&mut self) {
        if self.stopping || !self.dirty || self.retry.is_blocked() {
            return;
        }
        let Some(desired) = self.desired.clone() else {
            return;
        };
        self.dirty = false;

        if self.settings.skip_unchanged {
            if self.runs_config(self.starting, &desired) {
                tracing::debug!("Desired config already starting; no restart");
                return;
            }
            if self.runs_config(self.current, &desired) {
                tracing::debug!("Desired config already running; no restart");
                if let Some(superseded) = self.starting.take() {
                    self.abort_epoch(superseded);
                }
                return;
            }
        }

        if let Some(superseded) = self.starting.take() {
            self.abort_epoch(superseded);
        }

        self.launch(desired);
    }

    fn runs_config(&self, epoch: Option<Epoch>, config: &ProxyConfig) -> bool {
        epoch
            .and_then(|e| self.epochs.get(&e))
            .is_some_and(|record| *record.config == *config)
    }

    fn launch(&mut self, config: Arc<ProxyConfig>) {
        let epoch = Epoch(self.next_epoch);
        self.next_epoch += 1;

        let (ctx, control) = EpochContext::new(epoch);
        let ready_tx = self.events_tx.clone();
        let ctx = ctx.on_running(move || {
            let _ = ready_tx.send(AgentEvent::EpochRunning(epoch));
        });

        let mut record = EpochRecord {
            config: config.clone(),
            state: EpochState::Pending,
            control,
        };

        let runner = self.runner.clone();
        let exit_tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = runner.run(config, ctx).await;
            let _ = exit_tx.send(AgentEvent::EpochExited { epoch, result });
        });

        record.state = EpochState::Starting;
        self.epochs.insert(epoch, record);
        self.starting = Some(epoch);
        metrics::record_epoch_launched();
        tracing::info!(epoch = %epoch, "Launching proxy epoch");
    }

    fn abort_epoch(&mut self, epoch: Epoch) {
        if let Some(record) = self.epochs.get_mut(&epoch) {
            tracing::info!(epoch = %epoch, state = %record.state, "Aborting epoch");
            if record.state != EpochState::Draining {
                record.state = EpochState::Aborted;
            }
            record.control.abort();
        }
    }

    fn abort_all(&mut self) {
        let epochs: Vec<Epoch> = self.epochs.keys().copied().collect();
        for epoch in epochs {
            self.abort_epoch(epoch);
        }
        self.starting = None;
        self.current = None;
    }

    fn begin_drain(&mut self, epoch: Epoch) {
        let Some(record) = self.epochs.get_mut(&epoch) else {
            return;
        };

        record.state = EpochState::Draining;
        record.control.drain();

        let deadline = self.settings.drain_deadline();
        tracing::info!(epoch = %epoch, deadline = ?deadline, "Draining epoch");

        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            let _ = tx.send(AgentEvent::DrainDeadline(epoch));
        });
    }

    fn begin_stop(&mut self) {
        tracing::info!("Stopping restart agent");
        self.stopping = true;
        self.retry.cancel();

        if let Some(starting) = self.starting.take() {
            self.abort_epoch(starting);
        }
        if let Some(current) = self.current.take() {
            self.begin_drain(current);
        }
    }

    fn force_stop(&mut self) {
        tracing::warn!("Forced stop; terminating every epoch");
        self.forced = true;
        self.stopping = true;
        self.retry.cancel();
        self.abort_all();
    }
}

/// Why a launched epoch counts against the retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    /// Exited before it was running.
    Start,
    /// Exited while it was the serving epoch.
    Serving,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let mut config = AgentConfig::default();
        config.mesh.drain_secs = 2;
        config.mesh.parent_shutdown_secs = 3;
        config.retry.skip_unchanged = false;

        let settings = AgentSettings::from_config(&config);
        assert_eq!(settings.drain_deadline(), Duration::from_secs(5));
        assert!(!settings.skip_unchanged);
        assert_eq!(settings.retry.max_retries, 10);
    }
}
