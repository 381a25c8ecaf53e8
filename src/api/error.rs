//! Typed failures surfaced by the server transport

use thiserror::Error;

/// Failed mutation call: a machine-readable cause key plus an optional
/// human-readable detail
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{key}{}", detail_suffix(.detail))]
pub struct ApiError {
    pub key: String,
    pub detail: Option<String>,
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(d) if !d.is_empty() => format!(": {}", d),
        _ => String::new(),
    }
}

impl ApiError {
    pub fn new(key: impl Into<String>, detail: Option<String>) -> Self {
        let detail = detail.filter(|d| !d.is_empty());
        Self {
            key: key.into(),
            detail,
        }
    }

    /// Non-200 response
    pub fn http(status: reqwest::StatusCode) -> Self {
        Self::new("http", Some(status.to_string()))
    }

    /// Request never produced a response
    pub fn network(err: impl std::fmt::Display) -> Self {
        Self::new("network", Some(err.to_string()))
    }

    /// Response body was not the expected envelope
    pub fn invalid_response(err: impl std::fmt::Display) -> Self {
        Self::new("invalid_response", Some(err.to_string()))
    }

    pub fn cancelled() -> Self {
        Self::new("cancelled", None)
    }
}

/// Push channel failures. All of them are recoverable by reconnecting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("failed to connect to event channel: {0}")]
    Connect(String),

    #[error("event channel returned status {0}")]
    Status(u16),

    #[error("event channel stream failed: {0}")]
    Stream(String),

    #[error("event channel closed by server")]
    Ended,

    #[error("malformed hydration payload: {0}")]
    Malformed(String),

    #[error("server reported channel error `{key}`")]
    Server { key: String, detail: Option<String> },
}
