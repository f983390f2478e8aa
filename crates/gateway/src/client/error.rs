//! Errors surfaced to gateway callers

use reqwest::StatusCode;
use thiserror::Error;

/// Errors raised by the gateway client and the stream consumer
#[derive(Error, Debug)]
pub enum ClientError {
    /// The gateway (or the backend behind it) answered with a non-success status
    #[error("Request failed with status {status}{}", body_suffix(.body))]
    Status { status: StatusCode, body: String },

    /// The request never produced a response
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body broke off after it had started
    #[error("Stream read error: {0}")]
    StreamRead(String),

    /// A successful response body did not have the expected shape
    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl ClientError {
    /// HTTP status of a `Status` error
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            ClientError::Transport(e) => e.status(),
            _ => None,
        }
    }

    /// Whether the backend rejected the caller's credentials
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }

    /// Best-effort human message, preferring the backend's own `message` or
    /// `error.message` field when the body is JSON
    pub fn server_message(&self) -> Option<String> {
        let ClientError::Status { body, .. } = self else {
            return None;
        };
        let json: serde_json::Value = serde_json::from_str(body).ok()?;
        json.get("message")
            .or_else(|| json.get("error").and_then(|e| e.get("message")))
            .or_else(|| json.get("detail"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
    }
}

fn body_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(": {body}")
    }
}

/// Result type alias for client operations
pub type ClientResult<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        let err = ClientError::Status {
            status: StatusCode::UNAUTHORIZED,
            body: String::new(),
        };
        assert_eq!(err.to_string(), "Request failed with status 401 Unauthorized");
        assert!(err.is_unauthorized());

        let err = ClientError::Status {
            status: StatusCode::BAD_GATEWAY,
            body: "upstream down".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Request failed with status 502 Bad Gateway: upstream down"
        );
    }

    #[test]
    fn test_server_message_extraction() {
        let flat = ClientError::Status {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            body: r#"{"message":"Email already taken"}"#.to_string(),
        };
        assert_eq!(flat.server_message().as_deref(), Some("Email already taken"));

        let nested = ClientError::Status {
            status: StatusCode::NOT_FOUND,
            body: r#"{"error":{"type":"route_not_found","message":"No route"}}"#.to_string(),
        };
        assert_eq!(nested.server_message().as_deref(), Some("No route"));

        let plain = ClientError::Status {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: "boom".to_string(),
        };
        assert!(plain.server_message().is_none());
        assert!(ClientError::StreamRead("reset".into()).server_message().is_none());
    }
}
