//! Shared error types for the REST client and the event decoder.

use serde::Deserialize;
use thiserror::Error;

use crate::protocol::EventKind;

/// Error envelope the forum backend writes on failed `/api/*` calls.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    #[serde(default, alias = "message")]
    pub error: String,
}

/// Pull a user-facing message out of an error body, if the backend sent one.
pub fn try_error_detail(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ErrorBody>(body).ok()?;
    let message = parsed.error.trim();
    if message.is_empty() {
        None
    } else {
        Some(message.to_string())
    }
}

/// API error type for client-side use
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Deserialization error: {0}")]
    Deserialize(String),
    #[error("Not authenticated")]
    Unauthorized,
}

impl ApiError {
    /// Short message suitable for showing in the UI.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Http { status, body } => {
                try_error_detail(body).unwrap_or_else(|| format!("Request failed ({status})"))
            }
            ApiError::Network(_) => "Network error. Check your connection.".to_string(),
            ApiError::Deserialize(_) => "Unexpected response from server.".to_string(),
            ApiError::Unauthorized => "Please sign in again.".to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            ApiError::Unauthorized => Some(401),
            _ => None,
        }
    }
}

/// Why an inbound frame could not be turned into a `ServerEvent`.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),
    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("unknown event type `{0}`")]
    UnknownKind(String),
    #[error("malformed `{kind}` payload: {source}")]
    Payload {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },
}

impl DecodeError {
    pub fn is_unknown_kind(&self) -> bool {
        matches!(self, DecodeError::UnknownKind(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_prefers_backend_detail() {
        let err = ApiError::Http {
            status: 400,
            body: r#"{"error":"Title is required"}"#.into(),
        };
        assert_eq!(err.user_message(), "Title is required");

        let err = ApiError::Http { status: 502, body: "<html>".into() };
        assert_eq!(err.user_message(), "Request failed (502)");
    }
}
