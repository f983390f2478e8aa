//! Request-scoped proxy errors
//!
//! Everything here is raised before the upstream status line has been sent to
//! the caller, except [`ProxyError::StreamRead`], which can only be signalled
//! by aborting the already-started body.

use axum::{
    body::Body,
    http::{Response, StatusCode, header::CONTENT_TYPE},
    response::IntoResponse,
};
use thiserror::Error;

/// Errors that can occur while proxying one request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    /// No route rule claims the inbound path
    #[error("No route matches path '{path}'")]
    RouteNotFound { path: String },

    /// Upstream refused, reset, or went idle before responding
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Inbound body exceeds the configured limit
    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// Inbound request could not be turned into an upstream request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Upstream body failed after the response had started
    #[error("Stream read error: {0}")]
    StreamRead(String),
}

impl ProxyError {
    /// HTTP status reported to the caller
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            ProxyError::UpstreamUnavailable(_) | ProxyError::StreamRead(_) => {
                StatusCode::BAD_GATEWAY
            }
            ProxyError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Stable error tag used in response bodies and logs
    pub fn category(&self) -> &'static str {
        match self {
            ProxyError::RouteNotFound { .. } => "route_not_found",
            ProxyError::UpstreamUnavailable(_) => "upstream_unavailable",
            ProxyError::PayloadTooLarge { .. } => "payload_too_large",
            ProxyError::InvalidRequest(_) => "invalid_request",
            ProxyError::StreamRead(_) => "stream_read_error",
        }
    }

    /// Whether the caller is at fault
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }

    /// Wrap into an `io::Error` for aborting a response body stream
    pub fn into_io(self) -> std::io::Error {
        let kind = match self {
            ProxyError::UpstreamUnavailable(_) => std::io::ErrorKind::TimedOut,
            _ => std::io::ErrorKind::Other,
        };
        std::io::Error::new(kind, self)
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response<Body> {
        let body = serde_json::json!({
            "error": {
                "type": self.category(),
                "message": self.to_string(),
            }
        });

        let mut response = Response::new(Body::from(body.to_string()));
        *response.status_mut() = self.status();
        response.headers_mut().insert(
            CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/json"),
        );
        response
    }
}
