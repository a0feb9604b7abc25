//! Metrics collection and exposition.
//!
//! # Metrics
//! - `shadow_backend_requests_total` (counter): backend exchanges by side, status, method, path, host
//! - `shadow_backend_request_duration_seconds` (histogram): backend latency by side, method, path, host
//! - `shadow_diffs_total` (counter): mirrored requests by outcome
//! - `shadow_diff_fields_total` (counter): differing fields (status, protocol, headers, body)
//! - `shadow_diffs_dropped_total` (counter): comparisons skipped because the diff pool was full
//!
//! # Design Decisions
//! - Recording without an installed exporter is a no-op, so tests need no setup
//! - The proxy has no route templates, so the `path` label keeps only the first
//!   `metrics_path_segments` segments of the request path to bound cardinality

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::mirror::dispatcher::{BackendSample, MirrorReport};

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Truncate `path` to its first `segments` segments; `0` keeps the whole path.
///
/// `/users/42/orders` with 1 segment becomes `/users`.
pub fn path_label(path: &str, segments: usize) -> String {
    if segments == 0 {
        return path.to_string();
    }
    let kept: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .take(segments)
        .collect();
    format!("/{}", kept.join("/"))
}

/// Record one backend exchange.
pub fn record_backend_request(sample: &BackendSample, path_segments: usize) {
    let path = path_label(&sample.path, path_segments);
    metrics::counter!(
        "shadow_backend_requests_total",
        "side" => sample.side.as_str(),
        "status" => sample.status.to_string(),
        "method" => sample.method.clone(),
        "path" => path.clone(),
        "host" => sample.host.clone()
    )
    .increment(1);

    metrics::histogram!(
        "shadow_backend_request_duration_seconds",
        "side" => sample.side.as_str(),
        "method" => sample.method.clone(),
        "path" => path,
        "host" => sample.host.clone()
    )
    .record(sample.duration_seconds);
}

/// Record the outcome of one mirrored request.
pub fn record_diff(report: &MirrorReport) {
    metrics::counter!("shadow_diffs_total", "outcome" => report.outcome.label()).increment(1);

    if let Some(diff) = report.outcome.diff() {
        for field in diff.changed_fields() {
            metrics::counter!("shadow_diff_fields_total", "field" => field).increment(1);
        }
    }
}

/// Record a comparison skipped under load.
pub fn record_dropped_diff() {
    metrics::counter!("shadow_diffs_dropped_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_label_keeps_leading_segments() {
        assert_eq!(path_label("/users/42/orders", 1), "/users");
        assert_eq!(path_label("/users/42/orders", 2), "/users/42");
        assert_eq!(path_label("/users", 3), "/users");
        assert_eq!(path_label("/", 1), "/");
        assert_eq!(path_label("//a//b", 1), "/a");
    }

    #[test]
    fn zero_segments_keeps_raw_path() {
        assert_eq!(path_label("/users/42", 0), "/users/42");
    }
}
