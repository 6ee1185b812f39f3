//! Prometheus metrics exposition
//!
//! Service-level metrics:
//!
//! - `http_requests_total` (counter): labels `status`, `method`, `path`
//! - `http_request_duration_seconds` (histogram): label `path`
//! - `bridge_errors_total` (counter): labels `call`, `kind`
//!
//! The scheduler core emits `invite_attempts_total{outcome}` and
//! `invite_cooldowns_total` through the same global recorder.

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("http_request_duration_seconds".to_string()),
        DURATION_BUCKETS,
    )
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Must run before the controller is built so scheduler counters are not
/// dropped.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Record a completed control API request.
pub fn record_request(status: u16, method: &str, path: &str, duration_secs: f64) {
    metrics::counter!(
        "http_requests_total",
        "status" => status.to_string(),
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .increment(1);
    metrics::histogram!("http_request_duration_seconds", "path" => path.to_string())
        .record(duration_secs);
}

/// Record a failed bridge call.
pub fn record_bridge_error(call: &str, kind: &str) {
    metrics::counter!(
        "bridge_errors_total",
        "call" => call.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

#[cfg(test)]
pub(crate) fn isolated_recorder() -> (
    metrics_exporter_prometheus::PrometheusRecorder,
    PrometheusHandle,
) {
    let recorder = builder()
        .expect("failed to set histogram buckets")
        .build_recorder();
    let handle = recorder.handle();
    (recorder, handle)
}
