//! Request forking and mirror dispatch.
//!
//! # Responsibilities
//! - Buffer the inbound request once and fork it into two independent copies
//! - Forward both copies in parallel, each bounded by the request timeout
//! - Answer the caller with the primary response only
//! - Hand the primary/shadow pair to the differ on a background task
//!
//! # Design Decisions
//! - Primary failures are the only errors the caller can see
//! - Shadow failures end up in the report, never in the response
//! - Background diffs are admitted through a semaphore; when it is exhausted the
//!   diff is dropped and counted rather than queued
//! - Settings are swapped atomically so ignore lists can be reloaded live

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::http::{Request, Response};
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use crate::http::response::{
    inbound_error_response, primary_response, upstream_error_response, upstream_status,
};
use crate::mirror::capture::{capture, Capture, CaptureError, CapturedRequest};
use crate::mirror::response_diff::{ResponseDiffResult, ResponseDiffer};
use crate::mirror::transport::Transport;
use crate::mirror::Side;
use crate::observability::sink::DiffSink;

/// Reloadable dispatch settings.
#[derive(Debug, Clone)]
pub struct MirrorSettings {
    /// Largest request or response body that is buffered.
    pub max_body_bytes: usize,
    /// Deadline for each backend exchange, body included.
    pub request_timeout: Duration,
    /// Answer the caller only after the shadow exchange completed as well.
    pub wait_for_shadow: bool,
    pub differ: Arc<ResponseDiffer>,
}

impl Default for MirrorSettings {
    fn default() -> Self {
        Self {
            max_body_bytes: 2 * 1024 * 1024,
            request_timeout: Duration::from_secs(30),
            wait_for_shadow: true,
            differ: Arc::new(ResponseDiffer::default()),
        }
    }
}

/// One backend exchange, as reported to the observability sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendSample {
    pub side: Side,
    /// Response status, or the status a failure maps to.
    pub status: u16,
    pub method: String,
    pub path: String,
    pub host: String,
    pub duration_seconds: f64,
}

/// What the background task learned about one mirrored request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MirrorOutcome {
    /// Both sides answered and were compared.
    Compared { diff: ResponseDiffResult },
    PrimaryFailed { error: String },
    ShadowFailed { error: String },
    BothFailed { primary: String, shadow: String },
}

impl MirrorOutcome {
    /// Label used for metrics: `equal`, `different` or the failing side.
    pub fn label(&self) -> &'static str {
        match self {
            MirrorOutcome::Compared { diff } if diff.is_equal() => "equal",
            MirrorOutcome::Compared { .. } => "different",
            MirrorOutcome::PrimaryFailed { .. } => "primary_failed",
            MirrorOutcome::ShadowFailed { .. } => "shadow_failed",
            MirrorOutcome::BothFailed { .. } => "both_failed",
        }
    }

    /// The diff, when both captures succeeded.
    pub fn diff(&self) -> Option<&ResponseDiffResult> {
        match self {
            MirrorOutcome::Compared { diff } => Some(diff),
            _ => None,
        }
    }
}

/// The `response-diff` event emitted once per mirrored request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MirrorReport {
    pub request_id: String,
    pub method: String,
    pub path: String,
    pub main_elapsed_ms: Option<f64>,
    pub shadow_elapsed_ms: Option<f64>,
    #[serde(flatten)]
    pub outcome: MirrorOutcome,
}

impl MirrorReport {
    fn new(
        request: &CapturedRequest,
        request_id: &str,
        main: Result<Capture, CaptureError>,
        shadow: Result<Capture, CaptureError>,
        differ: &ResponseDiffer,
    ) -> Self {
        let elapsed_ms = |side: &Result<Capture, CaptureError>| {
            side.as_ref()
                .ok()
                .map(|c| c.elapsed().as_secs_f64() * 1000.0)
        };
        let main_elapsed_ms = elapsed_ms(&main);
        let shadow_elapsed_ms = elapsed_ms(&shadow);

        let outcome = match (main, shadow) {
            (Ok(main), Ok(shadow)) => MirrorOutcome::Compared {
                diff: differ.compare(&main.response, &shadow.response),
            },
            (Err(main), Ok(_)) => MirrorOutcome::PrimaryFailed {
                error: main.to_string(),
            },
            (Ok(_), Err(shadow)) => MirrorOutcome::ShadowFailed {
                error: shadow.to_string(),
            },
            (Err(main), Err(shadow)) => MirrorOutcome::BothFailed {
                primary: main.to_string(),
                shadow: shadow.to_string(),
            },
        };

        Self {
            request_id: request_id.to_string(),
            method: request.method.to_string(),
            path: request.path().to_string(),
            main_elapsed_ms,
            shadow_elapsed_ms,
            outcome,
        }
    }
}

/// Forks each inbound request to a primary and a shadow backend.
pub struct MirrorDispatcher {
    primary: Arc<dyn Transport>,
    shadow: Arc<dyn Transport>,
    sink: Arc<dyn DiffSink>,
    settings: ArcSwap<MirrorSettings>,
    diff_slots: Arc<Semaphore>,
    max_pending_diffs: usize,
}

impl MirrorDispatcher {
    /// Create a dispatcher running at most `max_pending_diffs` background diffs at once.
    pub fn new(
        primary: Arc<dyn Transport>,
        shadow: Arc<dyn Transport>,
        sink: Arc<dyn DiffSink>,
        settings: MirrorSettings,
        max_pending_diffs: usize,
    ) -> Self {
        Self {
            primary,
            shadow,
            sink,
            settings: ArcSwap::from_pointee(settings),
            diff_slots: Arc::new(Semaphore::new(max_pending_diffs)),
            max_pending_diffs,
        }
    }

    /// Current settings.
    pub fn settings(&self) -> Arc<MirrorSettings> {
        self.settings.load_full()
    }

    /// Replace the settings used by subsequent requests.
    pub fn reload(&self, settings: MirrorSettings) {
        tracing::info!(
            max_body_bytes = settings.max_body_bytes,
            wait_for_shadow = settings.wait_for_shadow,
            request_timeout = ?settings.request_timeout,
            "Mirror settings reloaded"
        );
        self.settings.store(Arc::new(settings));
    }

    /// Background diffs currently running.
    pub fn pending_diffs(&self) -> usize {
        self.max_pending_diffs
            .saturating_sub(self.diff_slots.available_permits())
    }

    /// Mirror `inbound` and return the primary backend's response.
    pub async fn dispatch(&self, request_id: &str, inbound: Request<Body>) -> Response<Body> {
        let settings = self.settings.load_full();

        let request = match CapturedRequest::read(inbound, settings.max_body_bytes).await {
            Ok(request) => Arc::new(request),
            Err(e) => {
                tracing::warn!(request_id = %request_id, error = %e, "Rejected inbound request");
                return inbound_error_response(&e);
            }
        };

        tracing::debug!(
            request_id = %request_id,
            method = %request.method,
            path = %request.path(),
            body_bytes = request.body.len(),
            "Mirroring request"
        );

        let primary = forward(
            self.primary.clone(),
            Side::Main,
            request.clone(),
            request_id.to_string(),
            settings.clone(),
            self.sink.clone(),
        );
        let shadow = forward(
            self.shadow.clone(),
            Side::Shadow,
            request.clone(),
            request_id.to_string(),
            settings.clone(),
            self.sink.clone(),
        );

        if settings.wait_for_shadow {
            let shadow = tokio::spawn(shadow);
            let primary = primary.await;
            let shadow = joined(shadow).await;
            let response = respond(request_id, &primary);
            match self.diff_slots.clone().try_acquire_owned() {
                Ok(permit) => self.spawn_report(
                    permit,
                    request,
                    request_id,
                    settings.differ.clone(),
                    primary,
                    async move { shadow },
                ),
                Err(_) => self.drop_report(request_id),
            }
            response
        } else {
            // The shadow exchange only starts once a diff slot is secured, and
            // then runs alongside the primary.
            let shadow = match self.diff_slots.clone().try_acquire_owned() {
                Ok(permit) => Some((permit, tokio::spawn(shadow))),
                Err(_) => None,
            };
            let primary = primary.await;
            let response = respond(request_id, &primary);
            match shadow {
                Some((permit, handle)) => self.spawn_report(
                    permit,
                    request,
                    request_id,
                    settings.differ.clone(),
                    primary,
                    joined(handle),
                ),
                None => self.drop_report(request_id),
            }
            response
        }
    }

    fn spawn_report<F>(
        &self,
        permit: OwnedSemaphorePermit,
        request: Arc<CapturedRequest>,
        request_id: &str,
        differ: Arc<ResponseDiffer>,
        primary: Result<Capture, CaptureError>,
        shadow: F,
    ) where
        F: Future<Output = Result<Capture, CaptureError>> + Send + 'static,
    {
        let sink = self.sink.clone();
        let request_id = request_id.to_string();

        tokio::spawn(async move {
            let _permit = permit;
            let shadow = shadow.await;
            let report = MirrorReport::new(&request, &request_id, primary, shadow, &differ);
            sink.record_diff(&report);
        });
    }

    fn drop_report(&self, request_id: &str) {
        tracing::warn!(request_id = %request_id, "Diff pool saturated, skipping shadow comparison");
        self.sink.record_dropped(request_id);
    }
}

/// Exchange one request copy with one backend and capture the response.
async fn forward(
    transport: Arc<dyn Transport>,
    side: Side,
    request: Arc<CapturedRequest>,
    request_id: String,
    settings: Arc<MirrorSettings>,
    sink: Arc<dyn DiffSink>,
) -> Result<Capture, CaptureError> {
    let started = Instant::now();
    let exchange = async {
        let response = transport.forward(request.to_request()).await?;
        capture(response, settings.max_body_bytes, started).await
    };

    let result = match tokio::time::timeout(settings.request_timeout, exchange).await {
        Ok(result) => result,
        Err(_) => Err(CaptureError::Timeout(settings.request_timeout)),
    };

    let status = match &result {
        Ok(response) => response.code(),
        Err(e) => upstream_status(e).as_u16(),
    };
    sink.record_backend(&BackendSample {
        side,
        status,
        method: request.method.to_string(),
        path: request.path().to_string(),
        host: transport.host().to_string(),
        duration_seconds: started.elapsed().as_secs_f64(),
    });

    match result {
        Ok(response) => Ok(Capture {
            id: request_id,
            side,
            request,
            response,
        }),
        Err(e) => {
            tracing::warn!(
                request_id = %request_id,
                side = %side,
                host = %transport.host(),
                error = %e,
                "Backend capture failed"
            );
            Err(e)
        }
    }
}

/// Result of a spawned forward; a panicked or cancelled task counts as aborted.
async fn joined(
    handle: JoinHandle<Result<Capture, CaptureError>>,
) -> Result<Capture, CaptureError> {
    handle
        .await
        .unwrap_or_else(|e| Err(CaptureError::Aborted(e.to_string())))
}

fn respond(request_id: &str, primary: &Result<Capture, CaptureError>) -> Response<Body> {
    match primary {
        Ok(capture) => primary_response(&capture.response),
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Primary backend failed");
            upstream_error_response(e)
        }
    }
}
