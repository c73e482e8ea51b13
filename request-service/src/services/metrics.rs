//! Prometheus metrics for request-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

use crate::models::{Audience, NotificationKind, ServiceStatus};

/// Status transition attempts by outcome (applied, rejected).
pub static STATUS_TRANSITIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "request_status_transitions_total",
        "Total number of service status transition attempts",
        &["from", "to", "outcome"]
    )
    .expect("Failed to register status_transitions_total")
});

/// Payment notifications by kind, audience and outcome.
pub static PAYMENT_NOTIFICATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "request_payment_notifications_total",
        "Total number of payment notifications handled",
        &["kind", "audience", "outcome"]  // delivered, skipped_duplicate, failed
    )
    .expect("Failed to register payment_notifications_total")
});

pub static SCHEDULER_RUNS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "request_scheduler_runs_total",
        "Total number of payment due scheduler runs",
        &["status"]
    )
    .expect("Failed to register scheduler_runs_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "request_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&STATUS_TRANSITIONS_TOTAL);
    Lazy::force(&PAYMENT_NOTIFICATIONS_TOTAL);
    Lazy::force(&SCHEDULER_RUNS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}

pub fn record_transition(from: ServiceStatus, to: ServiceStatus, applied: bool) {
    let outcome = if applied { "applied" } else { "rejected" };
    STATUS_TRANSITIONS_TOTAL
        .with_label_values(&[from.as_str(), to.as_str(), outcome])
        .inc();
}

pub fn record_notification(kind: NotificationKind, audience: Audience, outcome: &str) {
    PAYMENT_NOTIFICATIONS_TOTAL
        .with_label_values(&[kind.as_str(), audience.as_str(), outcome])
        .inc();
}

pub fn record_scheduler_run(status: &str) {
    SCHEDULER_RUNS_TOTAL.with_label_values(&[status]).inc();
}
