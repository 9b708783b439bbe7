//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define agent metrics (reloads, epoch launches, exits, retries)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `sidecar_reloads_total` (counter): reloads by trigger
//! - `sidecar_epochs_launched_total` (counter): epochs handed to the runner
//! - `sidecar_epoch_exits_total` (counter): epoch terminations by outcome
//! - `sidecar_epoch_retries_total` (counter): scheduled launch retries
//! - `sidecar_current_epoch` (gauge): epoch currently serving traffic
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Exporter failure is logged, never fatal

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::agent::Epoch;

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter")
        }
    }
}

pub fn record_reload(trigger: &'static str) {
    metrics::counter!("sidecar_reloads_total", "trigger" => trigger).increment(1);
}

pub fn record_epoch_launched() {
    metrics::counter!("sidecar_epochs_launched_total").increment(1);
}

pub fn record_epoch_exit(outcome: &'static str) {
    metrics::counter!("sidecar_epoch_exits_total", "outcome" => outcome).increment(1);
}

pub fn record_retry() {
    metrics::counter!("sidecar_epoch_retries_total").increment(1);
}

pub fn record_current_epoch(epoch: Epoch) {
    metrics::gauge!("sidecar_current_epoch").set(epoch.0 as f64);
}
