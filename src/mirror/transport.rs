//! Backend transport.
//!
//! # Responsibilities
//! - Define the narrow `forward(request) -> response` contract the dispatcher depends on
//! - Rewrite request URIs onto a backend base URL
//! - Send requests over a pooled `hyper-util` client
//!
//! # Design Decisions
//! - One transport per backend; the base URL is owned here, not by the dispatcher
//! - No retries and no timeouts at this layer; the dispatcher bounds each call

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response, Uri};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use url::Url;

/// Failure to exchange a request with a backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("invalid backend url {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("invalid upstream uri {0}")]
    InvalidUri(String),

    #[error("upstream request failed: {0}")]
    Upstream(String),
}

/// Sends one request to one backend.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Forward `request` and return the backend's response head and streaming body.
    async fn forward(&self, request: Request<Body>) -> Result<Response<Body>, TransportError>;

    /// Backend host, used to label metrics.
    fn host(&self) -> &str;
}

/// HTTP/1.1 and HTTP/2 transport to a single backend base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: Url,
    host: String,
    client: Client<HttpConnector, Body>,
}

impl HttpTransport {
    /// Create a transport for `base_url` (`http://host:port[/prefix]`).
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self, TransportError> {
        let invalid = |reason: &str| TransportError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: reason.to_string(),
        };

        let parsed = Url::parse(base_url).map_err(|e| invalid(&e.to_string()))?;
        if parsed.scheme() != "http" {
            return Err(invalid("only http backends are supported"));
        }
        let host = match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(invalid("missing host")),
        };

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            base_url: parsed,
            host,
            client,
        })
    }

    /// Map an inbound URI onto this backend, keeping path and query.
    ///
    /// A base URL path acts as a prefix: base `http://b/api` and inbound
    /// `/users?page=2` yield `http://b/api/users?page=2`.
    fn upstream_uri(&self, inbound: &Uri) -> Result<Uri, TransportError> {
        let prefix = self.base_url.path().trim_end_matches('/');
        let path_and_query = inbound
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        let uri = format!(
            "{}://{}{}{}",
            self.base_url.scheme(),
            self.host,
            prefix,
            path_and_query
        );
        uri.parse::<Uri>()
            .map_err(|e| TransportError::InvalidUri(format!("{uri}: {e}")))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn forward(&self, request: Request<Body>) -> Result<Response<Body>, TransportError> {
        let (mut parts, body) = request.into_parts();
        parts.uri = self.upstream_uri(&parts.uri)?;
        let request = Request::from_parts(parts, body);

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| TransportError::Upstream(e.to_string()))?;

        Ok(response.map(Body::new))
    }

    fn host(&self) -> &str {
        &self.host
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(base: &str) -> HttpTransport {
        HttpTransport::new(base, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn rewrites_onto_base_url() {
        let t = transport("http://127.0.0.1:3000");
        let uri = t.upstream_uri(&"/users?page=2".parse().unwrap()).unwrap();
        assert_eq!(uri, "http://127.0.0.1:3000/users?page=2");
        assert_eq!(t.host(), "127.0.0.1:3000");
    }

    #[test]
    fn base_path_is_a_prefix() {
        let t = transport("http://shadow.internal:8080/v2/");
        let uri = t.upstream_uri(&"/orders".parse().unwrap()).unwrap();
        assert_eq!(uri, "http://shadow.internal:8080/v2/orders");
    }

    #[test]
    fn rejects_unsupported_base_urls() {
        assert!(matches!(
            HttpTransport::new("https://example.com", Duration::from_secs(1)),
            Err(TransportError::InvalidBaseUrl { .. })
        ));
        assert!(HttpTransport::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let t = transport(&format!("http://{addr}"));
        let err = t.forward(Request::new(Body::empty())).await.unwrap_err();
        assert!(matches!(err, TransportError::Upstream(_)));
    }
}
