//! Metrics collection and exposition.
//!
//! # Metrics
//! - `edge_rate_limited_total` (counter): rejections by tier
//! - `edge_store_errors_total` (counter): swallowed counter store failures by op
//! - `edge_validation_failures_total` (counter): 400s by parameter kind
//! - `edge_panics_recovered_total` (counter)
//! - `edge_requests_total` (counter): forwarded requests by method, status
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until an
//!   exporter is installed
//! - The Prometheus exporter is opt-in via `observability.metrics_enabled`

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe();
            tracing::info!(address = %addr, "Metrics exporter listening");
        }
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

fn describe() {
    ::metrics::describe_counter!("edge_rate_limited_total", "Requests rejected by the rate limiter");
    ::metrics::describe_counter!("edge_store_errors_total", "Counter store failures that were failed open");
    ::metrics::describe_counter!("edge_validation_failures_total", "Requests rejected by parameter validation");
    ::metrics::describe_counter!("edge_panics_recovered_total", "Panics converted into 500 responses");
    ::metrics::describe_counter!("edge_requests_total", "Requests forwarded upstream");
}

pub fn record_rate_limited(tier: &'static str) {
    ::metrics::counter!("edge_rate_limited_total", "tier" => tier).increment(1);
}

pub fn record_store_error(op: &'static str) {
    ::metrics::counter!("edge_store_errors_total", "op" => op).increment(1);
}

pub fn record_validation_failure(kind: &'static str) {
    ::metrics::counter!("edge_validation_failures_total", "kind" => kind).increment(1);
}

pub fn record_panic_recovered() {
    ::metrics::counter!("edge_panics_recovered_total").increment(1);
}

pub fn record_request(method: &str, status: u16) {
    ::metrics::counter!(
        "edge_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
