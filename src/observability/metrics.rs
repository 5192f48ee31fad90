//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define call and fault metrics
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `faultline_calls_total` (counter): recorded calls by direction, status
//! - `faultline_call_duration_seconds` (histogram): call latency by direction
//! - `faultline_fault_responses_total` (counter): fault responses by status, class
//!
//! # Design Decisions
//! - Calls without a response are labelled `status="error"`
//! - Recording is a no-op until `init_metrics` installs the exporter

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Direction label for calls made to an upstream.
pub const UPSTREAM: &str = "upstream";

/// Direction label for calls made by the REST client.
pub const CLIENT: &str = "client";

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_call(direction: &'static str, status: Option<u16>, elapsed: Duration) {
    let status = status.map_or_else(|| "error".to_string(), |s| s.to_string());
    metrics::counter!("faultline_calls_total", "direction" => direction, "status" => status).increment(1);
    metrics::histogram!("faultline_call_duration_seconds", "direction" => direction)
        .record(elapsed.as_secs_f64());
}

pub fn record_fault(status: u16, class: &str) {
    metrics::counter!(
        "faultline_fault_responses_total",
        "status" => status.to_string(),
        "class" => class.to_string()
    )
    .increment(1);
}
