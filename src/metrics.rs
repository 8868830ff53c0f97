//! Prometheus metrics for jiralink
//!
//! Served as text on `GET /metrics` by the HTTP server.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    /// Counter: Jira API calls by action and outcome
    pub static ref JIRA_CALLS: CounterVec = register_counter_vec!(
        "jiralink_jira_calls_total",
        "Jira API calls by action and outcome",
        &["action", "outcome"]
    )
    .expect("Failed to create jira_calls metric");

    /// Counter: access token refreshes by outcome
    pub static ref TOKEN_REFRESHES: CounterVec = register_counter_vec!(
        "jiralink_token_refreshes_total",
        "Access token refreshes by outcome",
        &["outcome"]
    )
    .expect("Failed to create token_refreshes metric");

    /// Counter: per-issue results of imports and pulls
    pub static ref SYNC_ITEMS: CounterVec = register_counter_vec!(
        "jiralink_sync_items_total",
        "Issues handled by import and status sync, by result",
        &["operation", "result"]
    )
    .expect("Failed to create sync_items metric");

    /// Histogram: batch duration (seconds)
    pub static ref BATCH_DURATION: HistogramVec = register_histogram_vec!(
        "jiralink_batch_duration_seconds",
        "Duration of import and pull batches",
        &["operation"],
        vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    )
    .expect("Failed to create batch_duration metric");
}

/// Record the outcome of one gateway call
pub fn record_jira_call(action: &str, outcome: &str) {
    JIRA_CALLS.with_label_values(&[action, outcome]).inc();
}

pub fn record_token_refresh(outcome: &str) {
    TOKEN_REFRESHES.with_label_values(&[outcome]).inc();
}

/// Count `n` issues of an import or pull with the given result
pub fn record_sync_items(operation: &str, result: &str, n: usize) {
    SYNC_ITEMS
        .with_label_values(&[operation, result])
        .inc_by(n as f64);
}

pub fn record_batch_duration(operation: &str, duration_secs: f64) {
    BATCH_DURATION
        .with_label_values(&[operation])
        .observe(duration_secs);
}

/// Encode all metrics as Prometheus text format
pub fn encode_metrics() -> crate::Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| crate::JiraLinkError::Other(format!("metrics encoding failed: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| crate::JiraLinkError::Other(format!("metrics encoding failed: {}", e)))
}
