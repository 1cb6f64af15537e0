//! Metrics collection and exposition.
//!
//! # Metrics
//! - `db_retry_attempts_total` (counter): retries scheduled, by operation
//! - `db_retry_exhausted_total` (counter): operations that ran out of attempts
//! - `db_sessions_acquired_total` / `db_sessions_released_total` (counters)
//! - `db_circuit_rejections_total` (counter): calls failed fast by the breaker
//! - `db_health_checks_total` (counter): health probes, by result
//! - `db_circuit_open` (gauge): 1=open, 0=closed
//! - `db_consecutive_failures` (gauge)
//! - `db_healthy` (gauge): 1=healthy, 0=unhealthy
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus exporter is opt-in from the binary

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}

pub fn record_retry(operation: &'static str) {
    ::metrics::counter!("db_retry_attempts_total", "operation" => operation).increment(1);
}

pub fn record_retry_exhausted(operation: &'static str) {
    ::metrics::counter!("db_retry_exhausted_total", "operation" => operation).increment(1);
}

pub fn record_session_acquired() {
    ::metrics::counter!("db_sessions_acquired_total").increment(1);
}

pub fn record_session_released() {
    ::metrics::counter!("db_sessions_released_total").increment(1);
}

pub fn record_circuit_rejection() {
    ::metrics::counter!("db_circuit_rejections_total").increment(1);
}

pub fn record_health_check(healthy: bool) {
    let result = if healthy { "healthy" } else { "unhealthy" };
    ::metrics::counter!("db_health_checks_total", "result" => result).increment(1);
}

pub fn record_circuit_open(open: bool) {
    ::metrics::gauge!("db_circuit_open").set(if open { 1.0 } else { 0.0 });
}

pub fn record_consecutive_failures(failures: u32) {
    ::metrics::gauge!("db_consecutive_failures").set(f64::from(failures));
}

pub fn record_healthy(healthy: bool) {
    ::metrics::gauge!("db_healthy").set(if healthy { 1.0 } else { 0.0 });
}
