use reqwest::StatusCode;
use thiserror::Error;

/// Errors produced by [`crate::HttpRemoteClient`] and its sessions.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Error from the underlying HTTP client.
    #[error(transparent)]
    Request(#[from] reqwest::Error),
    /// Non-successful HTTP status returned by the service.
    #[error("HTTP {status}: {text}")]
    Http { status: StatusCode, text: String },
    /// The event stream broke off mid-answer.
    #[error("answer stream failed: {0}")]
    Stream(String),
    /// The caller's signal fired before the call completed.
    #[error("request cancelled")]
    Cancelled,
}
