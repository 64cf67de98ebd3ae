//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, route
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency by route
//! - `gateway_auth_rejections_total` (counter): rejected tokens by reason code
//! - `gateway_upstream_errors_total` (counter): failed upstream calls by route, kind
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Unmatched requests are labelled with route `none` to bound cardinality

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const REQUESTS_TOTAL: &str = "gateway_requests_total";
pub const REQUEST_DURATION: &str = "gateway_request_duration_seconds";
pub const AUTH_REJECTIONS_TOTAL: &str = "gateway_auth_rejections_total";
pub const UPSTREAM_ERRORS_TOTAL: &str = "gateway_upstream_errors_total";

/// Route label for requests that matched nothing.
pub const NO_ROUTE: &str = "none";

/// Install the Prometheus exporter and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    describe_counter!(REQUESTS_TOTAL, Unit::Count, "Requests handled by the gateway");
    describe_histogram!(REQUEST_DURATION, Unit::Seconds, "End-to-end request latency");
    describe_counter!(AUTH_REJECTIONS_TOTAL, Unit::Count, "Bearer tokens rejected");
    describe_counter!(UPSTREAM_ERRORS_TOTAL, Unit::Count, "Failed upstream calls");

    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, route: &str, started: Instant) {
    counter!(
        REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status.to_string(),
        "route" => route.to_string()
    )
    .increment(1);
    histogram!(REQUEST_DURATION, "route" => route.to_string())
        .record(started.elapsed().as_secs_f64());
}

pub fn record_auth_rejection(reason: &'static str) {
    counter!(AUTH_REJECTIONS_TOTAL, "reason" => reason).increment(1);
}

pub fn record_upstream_error(route: &str, kind: &'static str) {
    counter!(UPSTREAM_ERRORS_TOTAL, "route" => route.to_string(), "kind" => kind).increment(1);
}
