//! Shared fakes for agent and watcher integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use sidecar_agent::agent::{AgentHandle, AgentSettings, Epoch, EpochContext, RestartAgent};
use sidecar_agent::lifecycle::Shutdown;
use sidecar_agent::proxy::{ConfigGenerator, GenerateError, ProxyConfig, ProxyContext};
use sidecar_agent::resilience::RetryPolicy;
use sidecar_agent::runner::{ProcessRunner, RunError};
use sidecar_agent::watcher::{
    ChangeEvent, ChangeSender, ConfigKind, ConfigStore, Controller, RegistryError,
};

/// How the fake proxy behaves for one epoch.
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// Exit with `code` right away.
    Fail(i32),
    /// Never become ready; wait to be aborted.
    Hang,
    /// Become ready after `after`, then serve until drained or aborted.
    Serve { after: Duration, exit_on_drain: bool },
    /// Become ready after `after`, then crash with `code` after `crash_after`.
    ServeThenFail {
        after: Duration,
        crash_after: Duration,
        code: i32,
    },
}

impl Behavior {
    pub fn serve() -> Self {
        Behavior::Serve {
            after: Duration::from_millis(50),
            exit_on_drain: true,
        }
    }

    pub fn stubborn() -> Self {
        Behavior::Serve {
            after: Duration::from_millis(50),
            exit_on_drain: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    Started(Epoch),
    Running(Epoch),
    Aborted(Epoch),
    Exited(Epoch),
    Cleanup(Epoch),
    Panic,
}

pub struct FakeRunner {
    script: Mutex<VecDeque<Behavior>>,
    fallback: Behavior,
    log: Mutex<Vec<(Instant, Record)>>,
    configs: Mutex<Vec<(Epoch, Arc<ProxyConfig>)>>,
}

impl FakeRunner {
    /// Plays `script` epoch by epoch, then `fallback` forever.
    pub fn new(script: Vec<Behavior>, fallback: Behavior) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            log: Mutex::new(Vec::new()),
            configs: Mutex::new(Vec::new()),
        })
    }

    fn record(&self, record: Record) {
        self.log.lock().unwrap().push((Instant::now(), record));
    }

    pub fn records(&self) -> Vec<Record> {
        self.log.lock().unwrap().iter().map(|(_, r)| *r).collect()
    }

    pub fn has(&self, record: Record) -> bool {
        self.records().contains(&record)
    }

    pub fn time_of(&self, record: Record) -> Option<Instant> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .find(|(_, r)| *r == record)
            .map(|(t, _)| *t)
    }

    fn epochs_where(&self, f: impl Fn(&Record) -> Option<Epoch>) -> Vec<Epoch> {
        self.records().iter().filter_map(f).collect()
    }

    pub fn started(&self) -> Vec<Epoch> {
        self.epochs_where(|r| match r {
            Record::Started(e) => Some(*e),
            _ => None,
        })
    }

    pub fn running(&self) -> Vec<Epoch> {
        self.epochs_where(|r| match r {
            Record::Running(e) => Some(*e),
            _ => None,
        })
    }

    pub fn aborted(&self) -> Vec<Epoch> {
        self.epochs_where(|r| match r {
            Record::Aborted(e) => Some(*e),
            _ => None,
        })
    }

    pub fn cleanups(&self) -> Vec<Epoch> {
        self.epochs_where(|r| match r {
            Record::Cleanup(e) => Some(*e),
            _ => None,
        })
    }

    pub fn panics(&self) -> usize {
        self.records().iter().filter(|r| **r == Record::Panic).count()
    }

    pub fn config_of(&self, epoch: Epoch) -> Option<Arc<ProxyConfig>> {
        self.configs
            .lock()
            .unwrap()
            .iter()
            .find(|(e, _)| *e == epoch)
            .map(|(_, c)| c.clone())
    }

    pub fn last_config(&self) -> Option<Arc<ProxyConfig>> {
        self.configs.lock().unwrap().last().map(|(_, c)| c.clone())
    }

    /// Every started epoch was cleaned up, and only once.
    pub fn assert_cleaned_once(&self) {
        let mut started = self.started();
        let mut cleaned = self.cleanups();
        started.sort();
        cleaned.sort();
        assert_eq!(started, cleaned, "cleanup must match started epochs one to one");
    }

    fn next_behavior(&self) -> Behavior {
        self.script.lock().unwrap().pop_front().unwrap_or(self.fallback)
    }
}

#[async_trait]
impl ProcessRunner for FakeRunner {
    async fn run(&self, config: Arc<ProxyConfig>, mut ctx: EpochContext) -> Result<(), RunError> {
        let epoch = ctx.epoch;
        self.configs.lock().unwrap().push((epoch, config));
        self.record(Record::Started(epoch));

        let mut abort = ctx.abort.clone();
        let behavior = self.next_behavior();

        let (after, exit_on_drain, crash) = match behavior {
            Behavior::Fail(code) => {
                self.record(Record::Exited(epoch));
                return Err(RunError::Exited { code: Some(code) });
            }
            Behavior::Hang => {
                abort.aborted().await;
                self.record(Record::Aborted(epoch));
                return Err(RunError::Aborted);
            }
            Behavior::Serve {
                after,
                exit_on_drain,
            } => (after, exit_on_drain, None),
            Behavior::ServeThenFail {
                after,
                crash_after,
                code,
            } => (after, false, Some((crash_after, code))),
        };

        tokio::select! {
            _ = tokio::time::sleep(after) => {}
            _ = abort.aborted() => {
                self.record(Record::Aborted(epoch));
                return Err(RunError::Aborted);
            }
        }

        self.record(Record::Running(epoch));
        ctx.mark_running();

        if let Some((crash_after, code)) = crash {
            tokio::select! {
                _ = tokio::time::sleep(crash_after) => {
                    self.record(Record::Exited(epoch));
                    return Err(RunError::Exited { code: Some(code) });
                }
                _ = abort.aborted() => {
                    self.record(Record::Aborted(epoch));
                    return Err(RunError::Aborted);
                }
            }
        }

        if exit_on_drain {
            abort.draining().await;
            if abort.is_aborted() {
                self.record(Record::Aborted(epoch));
                return Err(RunError::Aborted);
            }
            self.record(Record::Exited(epoch));
            Ok(())
        } else {
            abort.aborted().await;
            self.record(Record::Aborted(epoch));
            Err(RunError::Aborted)
        }
    }

    fn cleanup(&self, epoch: Epoch) {
        self.record(Record::Cleanup(epoch));
    }

    fn panic(&self, _reason: &str) {
        self.record(Record::Panic);
    }
}

pub fn settings(max_retries: u32) -> AgentSettings {
    AgentSettings {
        retry: RetryPolicy {
            max_retries,
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(1),
        },
        skip_unchanged: true,
        drain: Duration::from_secs(1),
        parent_shutdown: Duration::from_secs(2),
    }
}

pub fn config(version: u64) -> ProxyConfig {
    ProxyConfig::new(json!({ "version": version }))
}

pub struct AgentUnderTest {
    pub handle: AgentHandle,
    pub shutdown: Shutdown,
    pub task: JoinHandle<()>,
}

pub fn spawn_agent(runner: Arc<FakeRunner>, settings: AgentSettings) -> AgentUnderTest {
    let (agent, handle) = RestartAgent::new(runner, settings);
    let shutdown = Shutdown::new();
    let task = tokio::spawn(agent.run(shutdown.subscribe()));
    AgentUnderTest {
        handle,
        shutdown,
        task,
    }
}

/// Poll `cond` every 10ms until it holds; panics after `limit`.
pub async fn wait_until(limit: Duration, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + limit;
    while !cond() {
        assert!(Instant::now() < deadline, "condition not met within {:?}", limit);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Renders the same document every time; counts calls.
#[derive(Default)]
pub struct FixedGenerator {
    pub calls: Arc<AtomicUsize>,
}

impl ConfigGenerator for FixedGenerator {
    fn generate(&self, ctx: &ProxyContext) -> Result<ProxyConfig, GenerateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ProxyConfig::new(json!({ "node": ctx.ip_address })))
    }
}

/// Renders a new document on every call.
#[derive(Default)]
pub struct CountingGenerator {
    pub calls: Arc<AtomicUsize>,
}

impl ConfigGenerator for CountingGenerator {
    fn generate(&self, _ctx: &ProxyContext) -> Result<ProxyConfig, GenerateError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ProxyConfig::new(json!({ "generation": n })))
    }
}

/// Fails the first `failures` calls.
pub struct FlakyGenerator {
    pub failures: AtomicUsize,
}

impl ConfigGenerator for FlakyGenerator {
    fn generate(&self, _ctx: &ProxyContext) -> Result<ProxyConfig, GenerateError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(GenerateError::Render("template missing".into()));
        }
        Ok(ProxyConfig::new(json!({ "ok": true })))
    }
}

/// Controller that keeps registered sinks so tests can emit events.
#[derive(Default)]
pub struct FakeController {
    pub sinks: Mutex<Vec<ChangeSender>>,
    pub reject_service: bool,
    pub reject_instance: bool,
}

impl FakeController {
    pub fn emit(&self, event: ChangeEvent) {
        for sink in self.sinks.lock().unwrap().iter() {
            sink.send(event.clone());
        }
    }
}

impl Controller for FakeController {
    fn append_service_handler(&self, sink: ChangeSender) -> Result<(), RegistryError> {
        if self.reject_service {
            return Err(RegistryError::Rejected("service handlers closed".into()));
        }
        self.sinks.lock().unwrap().push(sink);
        Ok(())
    }

    fn append_instance_handler(&self, sink: ChangeSender) -> Result<(), RegistryError> {
        if self.reject_instance {
            return Err(RegistryError::Unavailable("instance cache not synced".into()));
        }
        self.sinks.lock().unwrap().push(sink);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeConfigStore {
    pub handlers: Mutex<Vec<(ConfigKind, ChangeSender)>>,
}

impl FakeConfigStore {
    pub fn emit(&self, kind: ConfigKind, event: ChangeEvent) {
        for (k, sink) in self.handlers.lock().unwrap().iter() {
            if *k == kind {
                sink.send(event.clone());
            }
        }
    }
}

impl ConfigStore for FakeConfigStore {
    fn register_event_handler(&self, kind: ConfigKind, sink: ChangeSender) {
        self.handlers.lock().unwrap().push((kind, sink));
    }
}
