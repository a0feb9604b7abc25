//! Request and response capture.
//!
//! # Responsibilities
//! - Read an inbound request body exactly once, bounded by the configured limit
//! - Materialize independent request copies over the same captured bytes
//! - Project a backend response into an owned, immutable value
//!
//! # Design Decisions
//! - `Bytes` clones share one allocation; each copy still gets its own body reader
//! - A declared `Content-Length` above the limit fails before any body byte is read
//! - No retries: a transport failure is a capture failure

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Method, Request, Response, StatusCode, Uri, Version};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use thiserror::Error;

use crate::http::request::strip_hop_by_hop;
use crate::mirror::transport::TransportError;
use crate::mirror::Side;

/// Failure to obtain a complete request or response.
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    #[error("body exceeds the {limit} byte limit")]
    BodyTooLarge { limit: usize },

    #[error("failed to read body: {0}")]
    Body(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("no complete response within {0:?}")]
    Timeout(Duration),

    #[error("exchange aborted: {0}")]
    Aborted(String),
}

/// An inbound request with its body fully buffered.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub version: Version,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CapturedRequest {
    /// Buffer `request`, rejecting bodies larger than `max_body_bytes`.
    pub async fn read(request: Request<Body>, max_body_bytes: usize) -> Result<Self, CaptureError> {
        let (parts, body) = request.into_parts();
        let body = read_body(&parts.headers, body, max_body_bytes).await?;

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);

        Ok(Self {
            version: parts.version,
            method: parts.method,
            uri: parts.uri,
            headers,
            body,
        })
    }

    /// Request path without the query string.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Build a fresh request over the captured bytes.
    ///
    /// Every call returns a request with its own body reader, so consuming one
    /// copy leaves the others untouched. The protocol version is left to the
    /// upstream connection.
    pub fn to_request(&self) -> Request<Body> {
        let mut request = Request::new(Body::from(self.body.clone()));
        *request.method_mut() = self.method.clone();
        *request.uri_mut() = self.uri.clone();
        *request.headers_mut() = self.headers.clone();
        request
    }
}

/// A backend response with its body fully buffered.
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    pub version: Version,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Time from dispatch until the last body byte was read.
    pub elapsed: Duration,
}

impl CapturedResponse {
    /// Numeric status code.
    pub fn code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Protocol version, e.g. `HTTP/1.1`.
    pub fn protocol(&self) -> String {
        format!("{:?}", self.version)
    }

    /// Status line, e.g. `201 Created`.
    pub fn status_line(&self) -> String {
        self.status.to_string()
    }

    /// Declared `Content-Type`, or an empty string when absent or not text.
    pub fn content_type(&self) -> &str {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }
}

impl std::fmt::Display for CapturedResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} ({} headers, {} body bytes, {:?})",
            self.protocol(),
            self.status,
            self.headers.len(),
            self.body.len(),
            self.elapsed
        )
    }
}

/// Read a backend response into a [`CapturedResponse`].
///
/// `started` is the instant the request was dispatched.
pub async fn capture(
    response: Response<Body>,
    max_body_bytes: usize,
    started: Instant,
) -> Result<CapturedResponse, CaptureError> {
    let (parts, body) = response.into_parts();
    let body = read_body(&parts.headers, body, max_body_bytes).await?;

    Ok(CapturedResponse {
        version: parts.version,
        status: parts.status,
        headers: parts.headers,
        body,
        elapsed: started.elapsed(),
    })
}

/// One side of a mirrored exchange: the request that was sent and what came back.
#[derive(Debug, Clone)]
pub struct Capture {
    /// Request ID shared by both sides.
    pub id: String,
    pub side: Side,
    pub request: Arc<CapturedRequest>,
    pub response: CapturedResponse,
}

impl Capture {
    /// Time spent waiting on this backend.
    pub fn elapsed(&self) -> Duration {
        self.response.elapsed
    }
}

async fn read_body(headers: &HeaderMap, body: Body, limit: usize) -> Result<Bytes, CaptureError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > limit as u64) {
        return Err(CaptureError::BodyTooLarge { limit });
    }

    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(CaptureError::BodyTooLarge { limit }),
        Err(e) => Err(CaptureError::Body(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(body: &'static str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/orders?id=7")
            .header("content-type", "application/json")
            .header("connection", "keep-alive")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn request_copies_read_independently() {
        let captured = CapturedRequest::read(post(r#"{"a":1}"#), 1024).await.unwrap();
        assert_eq!(captured.path(), "/orders");
        assert!(captured.headers.get("connection").is_none());

        let first = captured.to_request();
        let second = captured.to_request();

        let first_body = first.into_body().collect().await.unwrap().to_bytes();
        let second_body = second.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(first_body, second_body);
        assert_eq!(&first_body[..], br#"{"a":1}"#);
        assert_eq!(captured.body, first_body);
    }

    #[tokio::test]
    async fn copies_keep_method_uri_and_headers() {
        let captured = CapturedRequest::read(post("x"), 1024).await.unwrap();
        let copy = captured.to_request();
        assert_eq!(copy.method(), Method::POST);
        assert_eq!(copy.uri(), "/orders?id=7");
        assert_eq!(copy.headers()["content-type"], "application/json");
    }

    #[tokio::test]
    async fn oversized_body_fails_fast() {
        let err = CapturedRequest::read(post("0123456789"), 4).await.unwrap_err();
        assert!(matches!(err, CaptureError::BodyTooLarge { limit: 4 }));
    }

    #[tokio::test]
    async fn declared_length_over_limit_is_rejected() {
        let request = Request::builder()
            .method(Method::PUT)
            .uri("/")
            .header("content-length", "4096")
            .body(Body::empty())
            .unwrap();
        let err = CapturedRequest::read(request, 1024).await.unwrap_err();
        assert!(matches!(err, CaptureError::BodyTooLarge { limit: 1024 }));
    }

    #[tokio::test]
    async fn body_at_limit_is_accepted() {
        let captured = CapturedRequest::read(post("1234"), 4).await.unwrap();
        assert_eq!(captured.body.len(), 4);
    }

    #[tokio::test]
    async fn captures_backend_response() {
        let response = Response::builder()
            .status(StatusCode::CREATED)
            .header("content-type", "application/json; charset=utf-8")
            .body(Body::from("ok"))
            .unwrap();

        let captured = capture(response, 1024, Instant::now()).await.unwrap();
        assert_eq!(captured.code(), 201);
        assert_eq!(captured.status_line(), "201 Created");
        assert_eq!(captured.protocol(), "HTTP/1.1");
        assert_eq!(captured.content_type(), "application/json; charset=utf-8");
        assert_eq!(&captured.body[..], b"ok");
        assert!(captured.to_string().starts_with("HTTP/1.1 201 Created"));
    }

    #[tokio::test]
    async fn oversized_response_is_a_capture_failure() {
        let response = Response::new(Body::from(vec![b'x'; 64]));
        let err = capture(response, 16, Instant::now()).await.unwrap_err();
        assert!(matches!(err, CaptureError::BodyTooLarge { limit: 16 }));
    }
}
