//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the megaphone server:
//! - HTTP request metrics (latency, counts, in-flight)
//! - Campaign state gauges (collected dynamically)
//! - Core dispatch metrics (re-registered from megaphone-core)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "megaphone_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("megaphone_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "megaphone_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Campaign Metrics (collected dynamically)
// =============================================================================

/// Campaigns by current status.
pub static CAMPAIGNS_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "megaphone_campaigns_by_status",
            "Current campaign count by status",
        ),
        &["status"],
    )
    .unwrap()
});

/// Dispatch runs currently in flight.
pub static RUNS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "megaphone_dispatch_runs_active",
        "Number of dispatch runs currently in flight",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Campaigns
    registry
        .register(Box::new(CAMPAIGNS_BY_STATUS.clone()))
        .unwrap();
    registry.register(Box::new(RUNS_ACTIVE.clone())).unwrap();

    // Core metrics (dispatcher, campaign lifecycle)
    for metric in megaphone_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Force registry initialization at startup.
pub fn init() {
    Lazy::force(&REGISTRY);
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so the gauges reflect the live store contents.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    RUNS_ACTIVE.set(state.active_run_count().await as i64);

    // Gauge covers the most recent 1000 campaigns
    if let Ok(campaigns) = state.store().list_campaigns(1000, 0) {
        let mut counts = std::collections::HashMap::new();
        for campaign in &campaigns {
            *counts.entry(campaign.status.as_str()).or_insert(0i64) += 1;
        }
        for status in [
            "queued",
            "processing",
            "completed",
            "completed_with_errors",
            "cancelled",
            "stalled",
        ] {
            CAMPAIGNS_BY_STATUS
                .with_label_values(&[status])
                .set(counts.get(status).copied().unwrap_or(0));
        }
    }
}

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let uuid_regex = regex_lite::Regex::new(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    )
    .unwrap();
    let numeric_regex = regex_lite::Regex::new(r"/\d+(/|$)").unwrap();

    let result = uuid_regex.replace_all(path, "{id}");
    let result = numeric_regex.replace_all(&result, "/{id}$1");
    result.to_string()
}
