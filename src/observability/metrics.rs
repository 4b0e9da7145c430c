//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define exchange and handler metrics
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `wsgate_exchanges_total` (counter): completed exchanges by status
//! - `wsgate_exchange_duration_seconds` (histogram): serve latency by endpoint
//! - `wsgate_exchange_aborts_total` (counter): aborted exchanges by reason
//! - `wsgate_handler_faults_total` (counter): faults dispatched by endpoint
//! - `wsgate_close_failures_total` (counter): failed `close` callbacks by endpoint
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so library code and
//!   tests can record freely
//! - Histogram buckets tuned for typical web latencies

use std::net::SocketAddr;
use std::time::Instant;

use ::metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
}

/// Install the Prometheus recorder and its scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    describe_metrics();

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )
        .map_err(|e| MetricsError::Build(e.to_string()))?
        .install()
        .map_err(|e| MetricsError::Build(e.to_string()))?;

    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

fn describe_metrics() {
    describe_counter!("wsgate_exchanges_total", "Exchanges completed, by response status");
    describe_histogram!(
        "wsgate_exchange_duration_seconds",
        "Time from request arrival to exchange close"
    );
    describe_counter!("wsgate_exchange_aborts_total", "Exchanges aborted, by reason");
    describe_counter!("wsgate_handler_faults_total", "Faults dispatched, by endpoint");
    describe_counter!(
        "wsgate_close_failures_total",
        "Handler close callbacks that failed, by endpoint"
    );
}

/// Record a completed exchange.
pub fn record_exchange(endpoint: &str, status: u16, start: Instant) {
    counter!("wsgate_exchanges_total", "status" => status.to_string()).increment(1);
    histogram!("wsgate_exchange_duration_seconds", "endpoint" => endpoint.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record an exchange abort.
pub fn record_exchange_abort(reason: &'static str) {
    counter!("wsgate_exchange_aborts_total", "reason" => reason).increment(1);
}

/// Record a fault or failure dispatched by an endpoint.
pub fn record_handler_fault(endpoint: &str) {
    counter!("wsgate_handler_faults_total", "endpoint" => endpoint.to_string()).increment(1);
}

/// Record failed `close` callbacks.
pub fn record_close_failures(endpoint: &str, count: usize) {
    if count > 0 {
        counter!("wsgate_close_failures_total", "endpoint" => endpoint.to_string())
            .increment(count as u64);
    }
}
