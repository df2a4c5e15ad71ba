//! Client observability metrics
//!
//! Prometheus-compatible metrics recorded through the `metrics` facade:
//! - Request duration and outcome per method
//! - Retries by reason
//! - Node liveness and registry size
//! - Sniff and health-check outcomes
//!
//! No exporter is installed here; the host application decides.

use std::time::{Duration, Instant};

/// Record request duration
pub fn record_request_duration(method: &str, duration: Duration) {
    metrics::histogram!(
        "sift_request_duration_seconds",
        "method" => method.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Record a completed request
pub fn record_request_success(method: &str, status: u16) {
    metrics::counter!(
        "sift_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);
}

/// Record a failed request
pub fn record_request_error(method: &str, error_type: &str) {
    metrics::counter!(
        "sift_request_errors_total",
        "method" => method.to_string(),
        "error_type" => error_type.to_string(),
    )
    .increment(1);
}

/// Record a retry attempt
pub fn record_retry(reason: &str) {
    metrics::counter!(
        "sift_request_retries_total",
        "reason" => reason.to_string(),
    )
    .increment(1);
}

/// Record node liveness (1 = alive, 0 = dead)
pub fn record_node_state(node_url: &str, alive: bool) {
    metrics::gauge!(
        "sift_node_alive",
        "node" => node_url.to_string(),
    )
    .set(if alive { 1.0 } else { 0.0 });
}

/// Record registry size after a membership change
pub fn record_registry_size(total: usize, alive: usize) {
    metrics::gauge!("sift_registry_nodes").set(total as f64);
    metrics::gauge!("sift_registry_nodes_alive").set(alive as f64);
}

/// Record the outcome of a sniff
pub fn record_sniff(outcome: &str, node_count: usize) {
    metrics::counter!(
        "sift_sniff_total",
        "outcome" => outcome.to_string(),
    )
    .increment(1);
    metrics::gauge!("sift_sniff_discovered_nodes").set(node_count as f64);
}

/// Record a single health probe
pub fn record_healthcheck(node_url: &str, alive: bool, duration: Duration) {
    metrics::counter!(
        "sift_healthcheck_total",
        "node" => node_url.to_string(),
        "outcome" => if alive { "alive" } else { "dead" },
    )
    .increment(1);
    metrics::histogram!("sift_healthcheck_duration_seconds").record(duration.as_secs_f64());
}

/// Guard for timing a logical request across all of its attempts
pub struct RequestTimer {
    method: String,
    start: Instant,
}

impl RequestTimer {
    /// Start timing a request
    pub fn new(method: &str) -> Self {
        Self {
            method: method.to_string(),
            start: Instant::now(),
        }
    }

    /// Elapsed time since the timer started
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Record success and duration
    pub fn success(self, status: u16) -> Duration {
        let duration = self.start.elapsed();
        record_request_duration(&self.method, duration);
        record_request_success(&self.method, status);
        duration
    }

    /// Record error and duration
    pub fn error(self, error_type: &str) {
        let duration = self.start.elapsed();
        record_request_duration(&self.method, duration);
        record_request_error(&self.method, error_type);
    }
}
