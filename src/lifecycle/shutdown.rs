//! Shutdown coordination for the agent.

use tokio::sync::watch;

/// How far shutdown has progressed. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Phase {
    Running,
    Graceful,
    Forced,
}

/// Coordinator for graceful shutdown.
///
/// Provides a level-triggered stop signal that all long-running tasks can
/// subscribe to. A task subscribing after the trigger still observes it.
/// A graceful stop can be escalated with [`force`](Self::force).
#[derive(Clone)]
pub struct Shutdown {
    tx: watch::Sender<Phase>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Phase::Running);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.advance(Phase::Graceful);
    }

    /// Escalate to an immediate stop: drains are cut short.
    pub fn force(&self) {
        self.advance(Phase::Forced);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow() >= Phase::Graceful
    }

    fn advance(&self, to: Phase) {
        self.tx.send_if_modified(|phase| {
            if *phase < to {
                *phase = to;
                true
            } else {
                false
            }
        });
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half of [`Shutdown`].
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<Phase>,
}

impl ShutdownSignal {
    /// Wait until shutdown is triggered.
    ///
    /// Also resolves when the coordinator is dropped.
    pub async fn recv(&mut self) {
        let _ = self.rx.wait_for(|phase| *phase >= Phase::Graceful).await;
    }

    /// Wait until shutdown is forced. Never resolves otherwise.
    pub async fn forced(&mut self) {
        if self.rx.wait_for(|phase| *phase == Phase::Forced).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_late_subscriber_sees_trigger() {
        let shutdown = Shutdown::new();
        shutdown.trigger();

        let mut signal = shutdown.subscribe();
        tokio::time::timeout(Duration::from_millis(100), signal.recv())
            .await
            .expect("signal should already be set");
    }

    #[tokio::test]
    async fn test_recv_waits_for_trigger() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.subscribe();

        let waiter = tokio::spawn(async move { signal.recv().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        shutdown.trigger();
        waiter.await.unwrap();
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_force_escalates_trigger() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.subscribe();

        shutdown.trigger();
        let forced = tokio::time::timeout(Duration::from_millis(50), signal.forced()).await;
        assert!(forced.is_err(), "graceful stop must not force");

        shutdown.force();
        tokio::time::timeout(Duration::from_millis(100), signal.forced())
            .await
            .expect("force should resolve");

        // forcing alone also counts as a stop, and never moves back
        shutdown.trigger();
        tokio::time::timeout(Duration::from_millis(100), signal.recv())
            .await
            .expect("forced stop is a stop");
    }

    #[tokio::test]
    async fn test_dropped_coordinator_does_not_force() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.subscribe();
        drop(shutdown);

        let forced = tokio::time::timeout(Duration::from_millis(50), signal.forced()).await;
        assert!(forced.is_err());
    }
}
