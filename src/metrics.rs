//! Prometheus metrics for the scanner.
//!
//! This module provides metrics for:
//! - Provider request latency and outcomes
//! - Scan cycles and their duration
//! - Opportunities emitted and suppressed
//! - Credential pool health and quota

use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::debug;

// === Metric Name Constants ===

/// Provider request latency metric name.
pub const METRIC_FEED_REQUEST_LATENCY: &str = "feed_request_latency_ms";
/// Provider requests counter metric name.
pub const METRIC_FEED_REQUESTS: &str = "feed_requests_total";
/// Scan cycle duration metric name.
pub const METRIC_SCAN_CYCLE_DURATION: &str = "scan_cycle_duration_ms";
/// Scan cycles counter metric name.
pub const METRIC_SCAN_CYCLES: &str = "scan_cycles_total";
/// Scan errors counter metric name.
pub const METRIC_SCAN_ERRORS: &str = "scan_errors_total";
/// Opportunities emitted counter metric name.
pub const METRIC_OPPORTUNITIES_DETECTED: &str = "opportunities_detected_total";
/// Opportunities suppressed counter metric name.
pub const METRIC_OPPORTUNITIES_SUPPRESSED: &str = "opportunities_suppressed_total";
/// Credential failovers counter metric name.
pub const METRIC_CREDENTIAL_FAILOVERS: &str = "credential_failovers_total";
/// Valid credentials gauge metric name.
pub const METRIC_VALID_CREDENTIALS: &str = "valid_credentials";
/// Remaining quota gauge metric name.
pub const METRIC_QUOTA_REMAINING: &str = "quota_remaining";

/// Initialize all metric descriptions.
/// Call this once at startup, after the recorder is installed.
pub fn init_metrics() {
    describe_histogram!(
        METRIC_FEED_REQUEST_LATENCY,
        "Odds provider request latency in milliseconds"
    );
    describe_histogram!(
        METRIC_SCAN_CYCLE_DURATION,
        "Duration of one pass over all sports in milliseconds"
    );

    describe_counter!(METRIC_FEED_REQUESTS, "Odds provider requests by endpoint and status");
    describe_counter!(METRIC_SCAN_CYCLES, "Scan cycles started");
    describe_counter!(METRIC_SCAN_ERRORS, "Errors reported by the scan loop");
    describe_counter!(
        METRIC_OPPORTUNITIES_DETECTED,
        "Surebets emitted after cooldown filtering"
    );
    describe_counter!(
        METRIC_OPPORTUNITIES_SUPPRESSED,
        "Surebets held back by the cooldown"
    );
    describe_counter!(METRIC_CREDENTIAL_FAILOVERS, "Credential failovers attempted");

    describe_gauge!(METRIC_VALID_CREDENTIALS, "Credentials not marked invalid");
    describe_gauge!(
        METRIC_QUOTA_REMAINING,
        "Remaining provider quota on the active credential"
    );

    debug!("Metrics initialized");
}

/// Install the Prometheus recorder and describe metrics.
///
/// The handle renders the text exposition for `/metrics`.
pub fn install_prometheus() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    init_metrics();
    Ok(handle)
}

/// Record a provider request. Status 0 means no HTTP response.
pub fn record_feed_request(start: Instant, endpoint: &str, status: u16) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_FEED_REQUEST_LATENCY, "endpoint" => endpoint.to_string()).record(latency_ms);
    counter!(
        METRIC_FEED_REQUESTS,
        "endpoint" => endpoint.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Increment scan cycles counter.
pub fn inc_scan_cycles() {
    counter!(METRIC_SCAN_CYCLES).increment(1);
}

/// Increment scan errors counter.
pub fn inc_scan_errors() {
    counter!(METRIC_SCAN_ERRORS).increment(1);
}

/// Increment opportunities counter for `sport`.
pub fn inc_opportunities_detected(sport: &str) {
    counter!(METRIC_OPPORTUNITIES_DETECTED, "sport" => sport.to_string()).increment(1);
}

/// Increment suppressed opportunities counter.
pub fn inc_opportunities_suppressed() {
    counter!(METRIC_OPPORTUNITIES_SUPPRESSED).increment(1);
}

/// Increment credential failovers counter.
pub fn inc_failovers() {
    counter!(METRIC_CREDENTIAL_FAILOVERS).increment(1);
}

/// Set valid credentials gauge.
pub fn set_valid_credentials(count: usize) {
    gauge!(METRIC_VALID_CREDENTIALS).set(count as f64);
}

/// Set remaining quota gauge.
pub fn set_quota_remaining(remaining: u32) {
    gauge!(METRIC_QUOTA_REMAINING).set(f64::from(remaining));
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        histogram!(self.metric_name).record(self.elapsed_ms());
    }
}

/// Create a latency timer for a scan cycle.
pub fn timer_scan_cycle() -> LatencyTimer {
    LatencyTimer::new(METRIC_SCAN_CYCLE_DURATION)
}
