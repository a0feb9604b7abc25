//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with a catch-all mirror handler
//! - Configure HTTP/1.1 and HTTP/2 support
//! - Wire up middleware (tracing, request ID, timeout)
//! - Build the primary and shadow transports from configuration
//! - Apply configuration reloads to the dispatcher
//! - Bind server to listener and drain on shutdown

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Request, Response},
    routing::any,
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::http::request::{request_id, RequestUuid};
use crate::mirror::{
    BodyDiffer, DiffOptions, HttpTransport, MirrorDispatcher, MirrorSettings, ResponseDiffer,
    TransportError,
};
use crate::observability::sink::{DiffSink, TracingSink};

/// Failure to start or run the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("backend setup failed: {0}")]
    Backend(#[from] TransportError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<MirrorDispatcher>,
}

/// HTTP server for the shadow proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    dispatcher: Arc<MirrorDispatcher>,
}

impl HttpServer {
    /// Create a server reporting to the default tracing/metrics sink.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let sink = TracingSink::new(config.observability.metrics_path_segments);
        Self::with_sink(config, Arc::new(sink))
    }

    /// Create a server reporting to `sink`.
    pub fn with_sink(config: ProxyConfig, sink: Arc<dyn DiffSink>) -> Result<Self, ServerError> {
        let connect_timeout = Duration::from_secs(config.timeouts.connect_secs);
        let primary = Arc::new(HttpTransport::new(&config.primary.url, connect_timeout)?);
        let shadow = Arc::new(HttpTransport::new(&config.shadow.url, connect_timeout)?);

        let dispatcher = Arc::new(MirrorDispatcher::new(
            primary,
            shadow,
            sink,
            mirror_settings(&config),
            config.mirror.max_pending_diffs,
        ));

        let state = AppState {
            dispatcher: dispatcher.clone(),
        };
        let router = Self::build_router(&config, state);

        Ok(Self {
            router,
            config,
            dispatcher,
        })
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// The outer timeout only catches clients that stall while sending; backend
    /// exchanges are bounded by the dispatcher.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let client_timeout = Duration::from_secs(config.timeouts.request_secs.saturating_mul(2));

        Router::new()
            .route("/{*path}", any(mirror_handler))
            .route("/", any(mirror_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(RequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TimeoutLayer::new(client_timeout)),
            )
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Configurations received on `config_updates` are applied live; the server
    /// stops accepting and drains in-flight requests once `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            primary = %self.config.primary.url,
            shadow = %self.config.shadow.url,
            "HTTP server starting"
        );

        let dispatcher = self.dispatcher.clone();
        let mut current = self.config;
        let reloader = tokio::spawn(async move {
            while let Some(next) = config_updates.recv().await {
                apply_reload(&dispatcher, &current, &next);
                current = next;
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        reloader.abort();
        tracing::info!(pending_diffs = self.dispatcher.pending_diffs(), "HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config the server started with.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<MirrorDispatcher> {
        &self.dispatcher
    }
}

/// Dispatch settings derived from `config`.
pub fn mirror_settings(config: &ProxyConfig) -> MirrorSettings {
    let mirror = &config.mirror;
    let differ = ResponseDiffer::new(
        DiffOptions::ignoring(&mirror.ignore_headers),
        BodyDiffer::new(&mirror.json_media_types, &mirror.xml_media_types),
    );

    MirrorSettings {
        max_body_bytes: mirror.max_body_bytes,
        request_timeout: Duration::from_secs(config.timeouts.request_secs),
        wait_for_shadow: mirror.wait_for_shadow,
        differ: Arc::new(differ),
    }
}

fn apply_reload(dispatcher: &MirrorDispatcher, current: &ProxyConfig, next: &ProxyConfig) {
    if current.primary != next.primary || current.shadow != next.shadow {
        tracing::warn!("Backend changes require a restart; keeping current backends");
    }
    if current.listener.bind_address != next.listener.bind_address {
        tracing::warn!("Listener changes require a restart");
    }
    if current.mirror.max_pending_diffs != next.mirror.max_pending_diffs {
        tracing::warn!("max_pending_diffs changes require a restart");
    }
    dispatcher.reload(mirror_settings(next));
}

/// Catch-all handler: every method, every path.
async fn mirror_handler(State(state): State<AppState>, request: Request<Body>) -> Response<Body> {
    let request_id = request_id(request.headers());
    state.dispatcher.dispatch(&request_id, request).await
}
