//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (requests, latency, upstream errors, rewrites)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_upstream_errors_total` (counter): unreachable/timeout/body failures
//! - `proxy_rewrite_outcomes_total` (counter): interceptor outcome by stage
//! - `proxy_asset_fetches_total` (counter): bundler fetches by kind, result
//! - `proxy_minify_total` (counter): minifications by content type, result
//! - `proxy_compression_saved_bytes_total` (counter): bytes saved by gzip
//!
//! # Design Decisions
//! - Without an installed recorder every call is a no-op
//! - Labels are low-cardinality: no paths, no hosts

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_error(kind: &'static str) {
    counter!("proxy_upstream_errors_total", "kind" => kind).increment(1);
}

pub fn record_rewrite_outcome(outcome: &'static str, stage: &'static str) {
    counter!("proxy_rewrite_outcomes_total", "outcome" => outcome, "stage" => stage).increment(1);
}

pub fn record_asset_fetch(kind: &'static str, result: &'static str) {
    counter!("proxy_asset_fetches_total", "kind" => kind, "result" => result).increment(1);
}

pub fn record_minify(content_type: &str, result: &'static str) {
    counter!(
        "proxy_minify_total",
        "content_type" => content_type.to_string(),
        "result" => result
    )
    .increment(1);
}

pub fn record_compression(before: usize, after: usize) {
    counter!("proxy_compression_saved_bytes_total").increment(before.saturating_sub(after) as u64);
}
