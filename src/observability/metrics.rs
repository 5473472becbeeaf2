//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define client metrics (requests, latency, endpoint churn)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `http_client_requests_total` (counter): requests by method, outcome
//! - `http_client_request_duration_seconds` (histogram): latency distribution
//! - `http_client_endpoints_opened_total` (counter): new connections
//! - `http_client_endpoints_closed_total` (counter): closed connections by reason
//! - `http_client_idle_endpoints` (gauge): current idle set size
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until a
//!   recorder is installed
//! - Labels are bounded (method, outcome, close reason)

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record a finished client request.
pub fn record_request(method: &str, outcome: &'static str, start: Instant) {
    counter!("http_client_requests_total", "method" => method.to_string(), "outcome" => outcome)
        .increment(1);
    histogram!("http_client_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record a newly connected endpoint.
pub fn record_endpoint_opened() {
    counter!("http_client_endpoints_opened_total").increment(1);
}

/// Record a closed endpoint.
pub fn record_endpoint_closed(reason: &'static str) {
    counter!("http_client_endpoints_closed_total", "reason" => reason).increment(1);
}

/// Update the idle endpoint gauge.
pub fn record_idle_endpoints(count: usize) {
    gauge!("http_client_idle_endpoints").set(count as f64);
}
