//! Prometheus metrics for the gateway.
//!
//! A single registry behind `OnceLock`, initialized once at startup.

use prometheus::{
    register_gauge_vec, register_histogram_vec, register_int_counter_vec, GaugeVec, HistogramVec,
    IntCounterVec,
};
use std::sync::OnceLock;

/// Container for all application metrics.
pub struct Metrics {
    /// Total requests by method, endpoint and status code
    pub request_count: IntCounterVec,

    /// Request duration histogram in seconds
    pub request_duration: HistogramVec,

    /// Streams currently being relayed, by model
    pub active_streams: GaugeVec,

    /// Token usage by model and token type
    pub token_usage: IntCounterVec,

    /// Terminal request outcomes by model (completed/failed/aborted)
    pub completed_requests: IntCounterVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Initialize the metrics registry.
///
/// Safe to call more than once; subsequent calls return the same instance.
pub fn init_metrics() -> &'static Metrics {
    METRICS.get_or_init(|| {
        let request_count = register_int_counter_vec!(
            "ollamao_requests_total",
            "Total number of requests",
            &["method", "endpoint", "status_code"]
        )
        .expect("Failed to register request_count metric");

        let request_duration = register_histogram_vec!(
            "ollamao_request_duration_seconds",
            "Request duration in seconds",
            &["method", "endpoint"],
            vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]
        )
        .expect("Failed to register request_duration metric");

        let active_streams = register_gauge_vec!(
            "ollamao_active_streams",
            "Number of streaming responses currently being relayed",
            &["model"]
        )
        .expect("Failed to register active_streams metric");

        let token_usage = register_int_counter_vec!(
            "ollamao_tokens_total",
            "Total number of tokens reported by backends",
            &["model", "token_type"]
        )
        .expect("Failed to register token_usage metric");

        let completed_requests = register_int_counter_vec!(
            "ollamao_request_outcomes_total",
            "Terminal request outcomes",
            &["model", "outcome"]
        )
        .expect("Failed to register completed_requests metric");

        Metrics {
            request_count,
            request_duration,
            active_streams,
            token_usage,
            completed_requests,
        }
    })
}

/// Get the metrics registry, initializing it if needed.
pub fn get_metrics() -> &'static Metrics {
    init_metrics()
}
