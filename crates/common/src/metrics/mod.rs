//! Metrics and observability utilities
//!
//! Prometheus metrics under a common prefix. Recording is a no-op until the gateway
//! installs an exporter, so library code and tests can call these freely.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::{Duration, Instant};

/// Metrics prefix for all ArticleHub metrics
pub const METRICS_PREFIX: &str = "articlehub";

/// Histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001, // 1ms
    0.005, // 5ms
    0.010, // 10ms
    0.025, // 25ms
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
    10.00, // 10s
];

/// Buckets for calls to scrapers, LLMs and the graph builder
pub const EXTERNAL_BUCKETS: &[f64] = &[0.100, 0.250, 0.500, 1.000, 2.000, 5.000, 10.00, 30.00, 60.00, 120.0];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Search metrics
    describe_counter!(
        format!("{}_search_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of article listing queries"
    );

    describe_histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Article listing latency in seconds"
    );

    describe_gauge!(
        format!("{}_search_results_count", METRICS_PREFIX),
        Unit::Count,
        "Rows returned by the last listing query"
    );

    describe_counter!(
        format!("{}_advanced_search_total", METRICS_PREFIX),
        Unit::Count,
        "Advanced search requests by outcome"
    );

    describe_histogram!(
        format!("{}_advanced_search_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Advanced search latency in seconds"
    );

    // Lifecycle metrics
    describe_counter!(
        format!("{}_articles_imported_total", METRICS_PREFIX),
        Unit::Count,
        "Import attempts by outcome"
    );

    describe_histogram!(
        format!("{}_import_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Article import latency in seconds"
    );

    describe_counter!(
        format!("{}_articles_deleted_total", METRICS_PREFIX),
        Unit::Count,
        "Deleted articles by graph cleanup outcome"
    );

    // External service metrics
    describe_counter!(
        format!("{}_external_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Calls to external services by outcome"
    );

    describe_histogram!(
        format!("{}_external_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "External service latency in seconds"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

fn outcome(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "error"
    }
}

/// Record an article listing query
pub fn record_search(filtered: bool, result_count: usize, duration: Duration) {
    let kind = if filtered { "filtered" } else { "all" };

    counter!(format!("{}_search_queries_total", METRICS_PREFIX), "kind" => kind).increment(1);

    histogram!(format!("{}_search_duration_seconds", METRICS_PREFIX), "kind" => kind)
        .record(duration.as_secs_f64());

    gauge!(format!("{}_search_results_count", METRICS_PREFIX), "kind" => kind).set(result_count as f64);
}

/// Record an advanced search; `shortened` marks queries rewritten before dispatch
pub fn record_advanced_search(success: bool, shortened: bool, duration: Duration) {
    counter!(
        format!("{}_advanced_search_total", METRICS_PREFIX),
        "status" => outcome(success),
        "shortened" => shortened.to_string()
    )
    .increment(1);

    histogram!(format!("{}_advanced_search_duration_seconds", METRICS_PREFIX))
        .record(duration.as_secs_f64());
}

/// Record an import attempt (`imported`, `duplicate` or `error`)
pub fn record_import(status: &'static str, duration: Duration) {
    counter!(format!("{}_articles_imported_total", METRICS_PREFIX), "status" => status).increment(1);

    histogram!(format!("{}_import_duration_seconds", METRICS_PREFIX)).record(duration.as_secs_f64());
}

/// Record a completed deletion and whether the graph index was cleaned
pub fn record_delete(graph_cleanup_success: bool) {
    counter!(
        format!("{}_articles_deleted_total", METRICS_PREFIX),
        "graph_cleanup" => outcome(graph_cleanup_success)
    )
    .increment(1);
}

/// Record one call to an external service
pub fn record_external(service: &'static str, success: bool, duration: Duration) {
    counter!(
        format!("{}_external_requests_total", METRICS_PREFIX),
        "service" => service,
        "status" => outcome(success)
    )
    .increment(1);

    histogram!(format!("{}_external_duration_seconds", METRICS_PREFIX), "service" => service)
        .record(duration.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_are_sorted() {
        for buckets in [LATENCY_BUCKETS, EXTERNAL_BUCKETS] {
            assert!(buckets.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_recording_without_exporter() {
        let metrics = RequestMetrics::start("GET", "/api/articles");
        metrics.finish(200);
        record_search(true, 3, Duration::from_millis(5));
        record_advanced_search(false, true, Duration::from_millis(5));
        record_import("duplicate", Duration::from_millis(1));
        record_delete(true);
        record_external("openalex", true, Duration::from_millis(20));
    }
}
