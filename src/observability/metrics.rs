//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by operation and outcome
//! - `gateway_request_duration_seconds` (histogram): latency by operation
//! - `gateway_circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `gateway_dependency_available` (gauge): 1=available, 0=unavailable
//! - `gateway_queue_depth` (gauge): requests waiting for replay
//! - `gateway_queue_dead_letters_total` (counter): by reason
//! - `gateway_retries_total` (counter): retry attempts by operation
//! - `backend_cache_lookups_total` (counter): hits and misses
//! - `backend_store_errors_total` (counter): by store operation

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(operation: &'static str, outcome: &'static str, start: Instant) {
    counter!("gateway_requests_total", "operation" => operation, "outcome" => outcome).increment(1);
    histogram!("gateway_request_duration_seconds", "operation" => operation)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_circuit_state(state: u8) {
    gauge!("gateway_circuit_state").set(state as f64);
}

pub fn record_dependency_available(dependency: &'static str, available: bool) {
    gauge!("gateway_dependency_available", "dependency" => dependency)
        .set(if available { 1.0 } else { 0.0 });
}

pub fn record_queue_depth(depth: usize) {
    gauge!("gateway_queue_depth").set(depth as f64);
}

pub fn record_dead_letter(reason: &'static str) {
    counter!("gateway_queue_dead_letters_total", "reason" => reason).increment(1);
}

pub fn record_retry(operation: &'static str) {
    counter!("gateway_retries_total", "operation" => operation).increment(1);
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("backend_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_store_error(operation: &'static str) {
    counter!("backend_store_errors_total", "operation" => operation).increment(1);
}
