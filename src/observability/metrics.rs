//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Install the Prometheus recorder for the `metrics` facade
//! - Serve the rendered metrics on a dedicated router
//! - Name and label every metric the service emits
//!
//! # Metrics
//! - `http_requests_total` (counter): requests by service, method, path, status
//! - `http_request_duration_seconds` (histogram): latency distribution
//! - `http_response_size_bytes` (histogram): response body size
//! - `lifecycle_events_total` (counter): start, stop, reload and failures
//! - `shutdown_actions_total` (counter): teardown outcome per action
//! - `counter_failures_total` (counter): failed counter increments
//!
//! # Design Decisions
//! - One recorder per process; every orchestrator shares its handle
//! - `/metrics` never lives on the public API listener

use std::sync::OnceLock;

use axum::{routing::get, Router};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION: &str = "http_request_duration_seconds";
pub const HTTP_RESPONSE_SIZE: &str = "http_response_size_bytes";
pub const LIFECYCLE_EVENTS_TOTAL: &str = "lifecycle_events_total";
pub const SHUTDOWN_ACTIONS_TOTAL: &str = "shutdown_actions_total";
pub const COUNTER_FAILURES_TOTAL: &str = "counter_failures_total";

const LATENCY_SECONDS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

const SIZE_BYTES: &[f64] = &[
    64.0, 256.0, 1024.0, 4096.0, 16384.0, 65536.0, 262144.0, 1048576.0,
];

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Handle to the process-wide Prometheus recorder, installing it on first use.
///
/// If another recorder is already installed globally, a detached recorder is
/// returned so `/metrics` still renders (empty) instead of failing startup.
pub fn exporter_handle() -> PrometheusHandle {
    HANDLE.get_or_init(install).clone()
}

fn install() -> PrometheusHandle {
    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(HTTP_REQUEST_DURATION.to_string()),
            LATENCY_SECONDS,
        )
        .and_then(|b| {
            b.set_buckets_for_metric(Matcher::Full(HTTP_RESPONSE_SIZE.to_string()), SIZE_BYTES)
        });

    let builder = match builder {
        Ok(builder) => builder,
        Err(e) => {
            tracing::warn!(error = %e, "Invalid histogram buckets, using summaries");
            PrometheusBuilder::new()
        }
    };

    match builder.install_recorder() {
        Ok(handle) => {
            tracing::debug!("Prometheus recorder installed");
            handle
        }
        Err(e) => {
            tracing::warn!(error = %e, "Could not install Prometheus recorder");
            PrometheusBuilder::new().build_recorder().handle()
        }
    }
}

/// Router serving `GET /metrics` from `handle`.
pub fn exporter_router(handle: PrometheusHandle) -> Router {
    Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move {
                handle.run_upkeep();
                handle.render()
            }
        }),
    )
}

/// Labels attached to every HTTP metric.
pub type RequestLabels = [(&'static str, String); 4];

pub fn record_request_count(labels: &RequestLabels) {
    metrics::counter!(HTTP_REQUESTS_TOTAL, labels).increment(1);
}

pub fn record_request_duration(labels: &RequestLabels, seconds: f64) {
    metrics::histogram!(HTTP_REQUEST_DURATION, labels).record(seconds);
}

pub fn record_response_size(labels: &RequestLabels, bytes: u64) {
    metrics::histogram!(HTTP_RESPONSE_SIZE, labels).record(bytes as f64);
}

/// Record a lifecycle transition (`start`, `stop`, `reload`, `start_failed`).
pub fn record_lifecycle_event(event: &'static str) {
    metrics::counter!(LIFECYCLE_EVENTS_TOTAL, "event" => event).increment(1);
}

/// Record the outcome (`ok`, `failed`, `timeout`) of one shutdown action.
pub fn record_shutdown_action(action: &str, outcome: &'static str) {
    metrics::counter!(
        SHUTDOWN_ACTIONS_TOTAL,
        "action" => action.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_counter_failure(counter: &'static str) {
    metrics::counter!(COUNTER_FAILURES_TOTAL, "counter" => counter).increment(1);
}
