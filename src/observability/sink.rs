//! Observability sink for mirrored traffic.
//!
//! # Responsibilities
//! - Receive per-backend samples and one `response-diff` report per request
//! - Fan them out to logs and metrics
//!
//! # Design Decisions
//! - Methods return nothing: a sink cannot fail request handling
//! - Equal comparisons log at debug, differences and failures at info/warn

use crate::mirror::dispatcher::{BackendSample, MirrorOutcome, MirrorReport};
use crate::observability::metrics;

/// Destination for mirror observations.
pub trait DiffSink: Send + Sync {
    /// One backend exchange finished (successfully or not).
    fn record_backend(&self, sample: &BackendSample);

    /// The background comparison of one mirrored request finished.
    fn record_diff(&self, report: &MirrorReport);

    /// A comparison was skipped because too many were in flight.
    fn record_dropped(&self, _request_id: &str) {}
}

/// Default sink: structured logs plus Prometheus metrics.
#[derive(Debug, Clone, Copy)]
pub struct TracingSink {
    path_segments: usize,
}

impl TracingSink {
    /// Label backend metrics with the first `path_segments` path segments (`0` for all).
    pub fn new(path_segments: usize) -> Self {
        Self { path_segments }
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new(1)
    }
}

impl DiffSink for TracingSink {
    fn record_backend(&self, sample: &BackendSample) {
        metrics::record_backend_request(sample, self.path_segments);
        tracing::debug!(
            side = %sample.side,
            status = sample.status,
            method = %sample.method,
            path = %sample.path,
            host = %sample.host,
            duration_seconds = sample.duration_seconds,
            "Backend exchange"
        );
    }

    fn record_diff(&self, report: &MirrorReport) {
        metrics::record_diff(report);

        let body = match serde_json::to_string(report) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(
                    request_id = %report.request_id,
                    error = %e,
                    "Failed to encode diff report"
                );
                return;
            }
        };

        match &report.outcome {
            MirrorOutcome::Compared { diff } if diff.is_equal() => tracing::debug!(
                event = "response-diff",
                request_id = %report.request_id,
                outcome = report.outcome.label(),
                "Responses match"
            ),
            MirrorOutcome::Compared { diff } => tracing::info!(
                event = "response-diff",
                request_id = %report.request_id,
                method = %report.method,
                path = %report.path,
                changed = ?diff.changed_fields(),
                diff = %body,
                "Responses differ"
            ),
            _ => tracing::warn!(
                event = "response-diff",
                request_id = %report.request_id,
                method = %report.method,
                path = %report.path,
                outcome = report.outcome.label(),
                diff = %body,
                "Mirrored request incomplete"
            ),
        }
    }

    fn record_dropped(&self, request_id: &str) {
        metrics::record_dropped_diff();
        tracing::debug!(request_id = %request_id, "Diff dropped");
    }
}
