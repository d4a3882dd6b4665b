//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Dispatcher (send attempts, retries, durations)
//! - Campaign lifecycle (runs finished by status)
//! - Provider gateway (request outcomes)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Dispatcher - Send Metrics
// =============================================================================

/// Send attempts total by outcome.
pub static SEND_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("megaphone_send_attempts_total", "Total send attempts"),
        &["result"], // "sent", "transient_error", "permanent_error"
    )
    .unwrap()
});

/// Provider send duration in seconds.
pub static SEND_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "megaphone_send_duration_seconds",
            "Duration of provider send requests",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["result"],
    )
    .unwrap()
});

/// Retries scheduled after a transient error.
pub static SEND_RETRIES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "megaphone_send_retries_total",
        "Total retries scheduled after transient errors",
    )
    .unwrap()
});

/// Records that exhausted their retry budget.
pub static RETRIES_EXHAUSTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "megaphone_retries_exhausted_total",
        "Records failed after exhausting all attempts",
    )
    .unwrap()
});

/// Time a worker spent waiting on the shared rate limiter.
pub static RATE_LIMIT_WAIT: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "megaphone_rate_limit_wait_seconds",
            "Time spent waiting for a send slot",
        )
        .buckets(vec![0.0, 0.01, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0]),
        &[],
    )
    .unwrap()
});

// =============================================================================
// Campaign Lifecycle Metrics
// =============================================================================

/// Dispatch runs finished by final campaign status.
pub static CAMPAIGNS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "megaphone_campaigns_finished_total",
            "Dispatch runs finished by final status",
        ),
        &["status"], // "completed", "completed_with_errors", "cancelled", "stalled"
    )
    .unwrap()
});

/// Records marked cancelled by the cancellation sweep.
pub static RECORDS_CANCELLED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "megaphone_records_cancelled_total",
        "Pending records cancelled by operator request",
    )
    .unwrap()
});

/// Collect all core metrics for registration with a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Dispatcher
        Box::new(SEND_ATTEMPTS.clone()),
        Box::new(SEND_DURATION.clone()),
        Box::new(SEND_RETRIES.clone()),
        Box::new(RETRIES_EXHAUSTED.clone()),
        Box::new(RATE_LIMIT_WAIT.clone()),
        // Campaign lifecycle
        Box::new(CAMPAIGNS_FINISHED.clone()),
        Box::new(RECORDS_CANCELLED.clone()),
    ]
}
