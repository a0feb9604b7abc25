//! Response handling and transformation.
//!
//! # Responsibilities
//! - Turn the captured primary response back into a client response
//! - Map capture failures to appropriate HTTP status codes
//!
//! # Design Decisions
//! - The primary response is written verbatim apart from hop-by-hop headers
//! - Backend timeouts result in 504 Gateway Timeout, other backend failures in 502
//! - Inbound bodies over the limit result in 413 and are never forwarded

use axum::body::Body;
use axum::http::{Response, StatusCode};
use axum::response::IntoResponse;

use crate::http::request::strip_hop_by_hop;
use crate::mirror::capture::{CaptureError, CapturedResponse};

/// Client response carrying the primary backend's status, headers and body.
pub fn primary_response(captured: &CapturedResponse) -> Response<Body> {
    let mut response = Response::new(Body::from(captured.body.clone()));
    *response.status_mut() = captured.status;
    *response.headers_mut() = captured.headers.clone();
    strip_hop_by_hop(response.headers_mut());
    response
}

/// Status a failed backend exchange maps to.
pub fn upstream_status(error: &CaptureError) -> StatusCode {
    match error {
        CaptureError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::BAD_GATEWAY,
    }
}

/// Client response for a failed primary exchange.
pub fn upstream_error_response(error: &CaptureError) -> Response<Body> {
    let message = match upstream_status(error) {
        StatusCode::GATEWAY_TIMEOUT => "Upstream request timed out",
        _ => "Upstream request failed",
    };
    (upstream_status(error), message).into_response()
}

/// Client response for an inbound request that could not be buffered.
pub fn inbound_error_response(error: &CaptureError) -> Response<Body> {
    match error {
        CaptureError::BodyTooLarge { .. } => {
            (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response()
        }
        _ => (StatusCode::BAD_REQUEST, "Failed to read request body").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::transport::TransportError;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, HeaderValue, Version};
    use std::time::Duration;

    #[test]
    fn primary_response_is_verbatim_without_hop_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-backend", HeaderValue::from_static("main"));
        headers.insert("connection", HeaderValue::from_static("keep-alive"));
        let captured = CapturedResponse {
            version: Version::HTTP_11,
            status: StatusCode::CREATED,
            headers,
            body: Bytes::from_static(b"ok"),
            elapsed: Duration::from_millis(1),
        };

        let response = primary_response(&captured);
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-backend"], "main");
        assert!(response.headers().get("connection").is_none());
    }

    #[test]
    fn maps_capture_errors() {
        let timeout = CaptureError::Timeout(Duration::from_secs(1));
        let refused = CaptureError::Transport(TransportError::Upstream("refused".into()));
        assert_eq!(upstream_error_response(&timeout).status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(upstream_error_response(&refused).status(), StatusCode::BAD_GATEWAY);

        let too_large = CaptureError::BodyTooLarge { limit: 1 };
        assert_eq!(inbound_error_response(&too_large).status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(upstream_status(&too_large), StatusCode::BAD_GATEWAY);
        assert_eq!(
            inbound_error_response(&CaptureError::Body("reset".into())).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
