//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define server metrics (accepts, active channels, reaping, tasks)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `gatehouse_connections_accepted_total` (counter)
//! - `gatehouse_accept_errors_total` (counter): by error kind
//! - `gatehouse_active_channels` (gauge): registry size
//! - `gatehouse_channels_reaped_total` (counter)
//! - `gatehouse_tasks_total` (counter): by outcome (ok, error, panic)
//! - `gatehouse_pending_tasks` (gauge): dispatcher queue depth

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_connection_accepted() {
    counter!("gatehouse_connections_accepted_total").increment(1);
}

pub fn record_accept_error(kind: &'static str) {
    counter!("gatehouse_accept_errors_total", "kind" => kind).increment(1);
}

pub fn set_active_channels(count: usize) {
    gauge!("gatehouse_active_channels").set(count as f64);
}

pub fn record_channels_reaped(count: usize) {
    counter!("gatehouse_channels_reaped_total").increment(count as u64);
}

pub fn record_task(outcome: &'static str) {
    counter!("gatehouse_tasks_total", "outcome" => outcome).increment(1);
}

pub fn set_pending_tasks(count: usize) {
    gauge!("gatehouse_pending_tasks").set(count as f64);
}
