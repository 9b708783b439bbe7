//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to internal events
//! - Trigger appropriate actions (shutdown, reload)
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A second SIGTERM/SIGINT forces shutdown, cutting proxy drains short
//! - SIGHUP forces a reload, not shutdown

use crate::lifecycle::Shutdown;
use crate::watcher::{ChangeEvent, ChangeSender};

/// Listen for OS signals until shutdown is forced.
///
/// The first SIGINT/SIGTERM triggers `shutdown`, the next one forces it;
/// SIGHUP pushes a manual reload onto the watcher ingress. Callers abort
/// the task once they are done.
#[cfg(unix)]
pub async fn listen(shutdown: Shutdown, reload: ChangeSender) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut hangup = signal(SignalKind::hangup())?;

    loop {
        let name = tokio::select! {
            _ = terminate.recv() => "SIGTERM",
            _ = interrupt.recv() => "SIGINT",
            _ = hangup.recv() => {
                tracing::info!(signal = "SIGHUP", "Reload requested");
                reload.send(ChangeEvent::Manual);
                continue;
            }
        };

        if shutdown.is_triggered() {
            tracing::warn!(signal = name, "Second shutdown signal; forcing shutdown");
            shutdown.force();
            break;
        }
        tracing::info!(signal = name, "Shutdown signal received");
        shutdown.trigger();
    }

    Ok(())
}

#[cfg(not(unix))]
pub async fn listen(shutdown: Shutdown, _reload: ChangeSender) -> std::io::Result<()> {
    loop {
        tokio::signal::ctrl_c().await?;
        if shutdown.is_triggered() {
            tracing::warn!("Second shutdown signal; forcing shutdown");
            shutdown.force();
            break;
        }
        tracing::info!("Shutdown signal received");
        shutdown.trigger();
    }
    Ok(())
}
