//! Prometheus Metrics Definitions
//!
//! Registered once in the default registry and exposed at `/metrics`.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use opsflow_cache::{Lookup, LookupObserver};
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

/// HTTP request latency buckets (seconds)
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// `None` if registration failed; recording is then a no-op.
pub static METRICS: Lazy<Option<OpsflowMetrics>> = Lazy::new(|| match OpsflowMetrics::new() {
    Ok(metrics) => Some(metrics),
    Err(e) => {
        tracing::error!(error = %e, "Failed to register metrics");
        None
    }
});

pub fn metrics() -> Option<&'static OpsflowMetrics> {
    METRICS.as_ref()
}

#[derive(Clone)]
pub struct OpsflowMetrics {
    /// labels: method, path, status
    pub http_requests_total: CounterVec,

    /// labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// labels: family, outcome (hit/miss)
    pub cache_lookups_total: CounterVec,

    /// labels: family
    pub cache_invalidations_total: CounterVec,

    /// Entries removed by the background sweep
    pub cache_expired_total: CounterVec,

    /// labels: kind, status
    pub sms_sends_total: CounterVec,

    pub websocket_connections: Gauge,
}

impl OpsflowMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "opsflow_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )?,
            http_request_duration_seconds: register_histogram_vec!(
                "opsflow_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )?,
            cache_lookups_total: register_counter_vec!(
                "opsflow_cache_lookups_total",
                "Memoized reads by family and outcome",
                &["family", "outcome"]
            )?,
            cache_invalidations_total: register_counter_vec!(
                "opsflow_cache_invalidations_total",
                "Cache entries evicted by writes",
                &["family"]
            )?,
            cache_expired_total: register_counter_vec!(
                "opsflow_cache_expired_total",
                "Expired cache entries removed by the cleanup job",
                &["job"]
            )?,
            sms_sends_total: register_counter_vec!(
                "opsflow_sms_sends_total",
                "SMS send attempts",
                &["kind", "status"]
            )?,
            websocket_connections: register_gauge!(
                "opsflow_websocket_connections",
                "Current number of active WebSocket connections"
            )?,
        })
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    pub fn record_cache_lookup(&self, namespace: &str, outcome: Lookup) {
        self.cache_lookups_total
            .with_label_values(&[family(namespace), outcome.as_str()])
            .inc();
    }

    pub fn record_invalidation(&self, family: &str, removed: usize) {
        self.cache_invalidations_total
            .with_label_values(&[family])
            .inc_by(removed as f64);
    }

    pub fn record_expired(&self, removed: usize) {
        self.cache_expired_total
            .with_label_values(&["cache_cleanup"])
            .inc_by(removed as f64);
    }

    pub fn record_sms(&self, kind: &str, success: bool) {
        let status = if success { "success" } else { "error" };
        self.sms_sends_total.with_label_values(&[kind, status]).inc();
    }

    pub fn ws_connected(&self) {
        self.websocket_connections.inc();
    }

    pub fn ws_disconnected(&self) {
        self.websocket_connections.dec();
    }
}

/// Leading namespace segment. Keeps per-customer namespaces out of label
/// values.
fn family(namespace: &str) -> &str {
    namespace.split(':').next().unwrap_or(namespace)
}

/// Feeds memoizer lookups into `opsflow_cache_lookups_total`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CacheMetricsObserver;

impl LookupObserver for CacheMetricsObserver {
    fn record(&self, namespace: &str, outcome: Lookup) {
        if let Some(m) = metrics() {
            m.record_cache_lookup(namespace, outcome);
        }
    }
}

/// Handler for GET /metrics
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() -> Result<(), String> {
        let metrics = metrics().ok_or("Metrics init failed")?;
        metrics.record_http_request("GET", "/api/customers", 200, 0.015);
        Ok(())
    }

    #[test]
    fn test_family_strips_ids() {
        assert_eq!(family("customers"), "customers");
        assert_eq!(family("customer:550e8400-e29b-41d4-a716-446655440000"), "customer");
        assert_eq!(family("actions:customer:1"), "actions");
    }

    #[test]
    fn test_cache_observer_counts() -> Result<(), String> {
        let metrics = metrics().ok_or("Metrics init failed")?;
        let before = metrics
            .cache_lookups_total
            .with_label_values(&["templates", "hit"])
            .get();
        CacheMetricsObserver.record("templates", Lookup::Hit);
        let after = metrics
            .cache_lookups_total
            .with_label_values(&["templates", "hit"])
            .get();
        assert!(after >= before + 1.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_metrics_handler_encodes() {
        if let Some(m) = metrics() {
            m.record_sms("bulk", true);
        }
        let response = metrics_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
