//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_forwarded_requests_total` (counter): forwards by router, method, status
//! - `gateway_forward_duration_seconds` (histogram): time to upstream response headers
//! - `gateway_forward_errors_total` (counter): failed forwards by router, error kind
//! - `gateway_open_connections` (gauge): inbound connections currently registered
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Metric names.
pub mod names {
    pub const FORWARDED_REQUESTS_TOTAL: &str = "gateway_forwarded_requests_total";
    pub const FORWARD_DURATION_SECONDS: &str = "gateway_forward_duration_seconds";
    pub const FORWARD_ERRORS_TOTAL: &str = "gateway_forward_errors_total";
    pub const OPEN_CONNECTIONS: &str = "gateway_open_connections";
}

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
///
/// Must run inside the Tokio runtime. Returns `false` when already installed
/// or when installation fails.
pub fn init_metrics(addr: SocketAddr) -> bool {
    if INSTALLED.get().is_some() {
        tracing::debug!("Prometheus metrics already initialized");
        return false;
    }

    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            let _ = INSTALLED.set(());
            tracing::info!(address = %addr, "Prometheus metrics endpoint listening");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            false
        }
    }
}

/// Record a forward that produced an upstream response.
pub fn record_forward(router: &str, method: &str, status: u16, start: Instant) {
    counter!(
        names::FORWARDED_REQUESTS_TOTAL,
        "router" => router.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(names::FORWARD_DURATION_SECONDS, "router" => router.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record a forward that failed before an upstream response was received.
pub fn record_forward_error(router: &str, kind: &'static str) {
    counter!(names::FORWARD_ERRORS_TOTAL, "router" => router.to_string(), "kind" => kind).increment(1);
}

pub fn connection_opened() {
    gauge!(names::OPEN_CONNECTIONS).increment(1.0);
}

pub fn connection_closed() {
    gauge!(names::OPEN_CONNECTIONS).decrement(1.0);
}
