//! Metrics collection for observability

use prometheus::{
    register_counter_vec_with_registry, register_counter_with_registry,
    register_histogram_vec_with_registry, register_histogram_with_registry, Counter, CounterVec,
    Histogram, HistogramVec, Opts, Registry,
};
use crate::knowledge::MergeReport;
use once_cell::sync::Lazy;
use std::sync::Arc;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| {
    Arc::new(Metrics::new().expect("Failed to initialize metrics"))
});

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Fetcher metrics
    pub backend_requests: CounterVec,
    pub fetch_duration: HistogramVec,

    // Scoring and extraction
    pub reliability_scores: Histogram,
    pub facts_extracted: Counter,

    // Knowledge store
    pub merge_outcomes: CounterVec,
    pub persistence_failures: Counter,

    // Coordinator
    pub queries: CounterVec,
    pub query_duration: Histogram,

    // HTTP surface
    pub http_request_duration: HistogramVec,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let registry = Registry::new();

        let backend_requests = register_counter_vec_with_registry!(
            Opts::new("learning_backend_requests_total", "Search backend requests by outcome"),
            &["backend", "status"],
            registry
        )?;

        let fetch_duration = register_histogram_vec_with_registry!(
            "learning_fetch_duration_seconds",
            "Search backend latency in seconds",
            &["backend"],
            registry
        )?;

        let reliability_scores = register_histogram_with_registry!(
            "learning_reliability_score",
            "Distribution of source reliability scores",
            vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0],
            registry
        )?;

        let facts_extracted = register_counter_with_registry!(
            Opts::new("learning_facts_extracted_total", "Candidate facts produced by extraction"),
            registry
        )?;

        let merge_outcomes = register_counter_vec_with_registry!(
            Opts::new("learning_merge_outcomes_total", "Merged facts by outcome"),
            &["outcome"],
            registry
        )?;

        let persistence_failures = register_counter_with_registry!(
            Opts::new(
                "learning_persistence_failures_total",
                "Snapshot writes that failed after retry"
            ),
            registry
        )?;

        let queries = register_counter_vec_with_registry!(
            Opts::new("learning_queries_total", "Handled queries by outcome"),
            &["outcome"],
            registry
        )?;

        let query_duration = register_histogram_with_registry!(
            "learning_query_duration_seconds",
            "End-to-end query handling time in seconds",
            registry
        )?;

        let http_request_duration = register_histogram_vec_with_registry!(
            "learning_http_request_duration_seconds",
            "HTTP request duration in seconds",
            &["endpoint"],
            registry
        )?;

        Ok(Self {
            registry,
            backend_requests,
            fetch_duration,
            reliability_scores,
            facts_extracted,
            merge_outcomes,
            persistence_failures,
            queries,
            query_duration,
            http_request_duration,
        })
    }

    /// Get the metrics registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a backend request; status is `success`, `error`, `timeout`
    /// or `circuit_open`
    pub fn record_backend_request(&self, backend: &str, status: &str) {
        self.backend_requests.with_label_values(&[backend, status]).inc();
    }

    pub fn record_reliability(&self, score: f32) {
        self.reliability_scores.observe(score as f64);
    }

    /// Record the outcome counts of one merge
    pub fn record_merge(&self, report: &MergeReport) {
        for (outcome, count) in [
            ("added", report.added),
            ("updated", report.updated),
            ("refreshed", report.refreshed),
            ("rejected", report.rejected),
        ] {
            if count > 0 {
                self.merge_outcomes.with_label_values(&[outcome]).inc_by(count as f64);
            }
        }
    }

    /// Record a finished query
    pub fn record_query(&self, outcome: &str, seconds: f64) {
        self.queries.with_label_values(&[outcome]).inc();
        self.query_duration.observe(seconds);
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or_default();

        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Helper macro to time operations
#[macro_export]
macro_rules! time_operation {
    ($histogram:expr, $label:expr, $operation:expr) => {{
        let timer = $histogram.with_label_values(&[$label]).start_timer();
        let result = $operation;
        timer.observe_duration();
        result
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        let metrics = Metrics::new();
        assert!(metrics.is_ok());
    }

    #[test]
    fn test_record_and_export() {
        let metrics = Metrics::new().unwrap();
        metrics.record_backend_request("wikipedia", "success");
        metrics.record_backend_request("duckduckgo", "timeout");
        metrics.record_reliability(0.9);
        metrics.record_merge(&MergeReport {
            added: 2,
            rejected: 1,
            refreshed: 1,
            ..MergeReport::default()
        });
        metrics.record_query("done", 0.25);

        let text = metrics.export_prometheus();
        assert!(text.contains("learning_backend_requests_total"));
        assert!(text.contains("backend=\"wikipedia\""));
        assert!(text.contains("outcome=\"rejected\""));
        assert!(text.contains("outcome=\"refreshed\""));
        assert!(!text.contains("outcome=\"updated\""));
    }
}
