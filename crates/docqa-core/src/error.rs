use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;

/// Error type the remote collaborator reports through its traits.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Remote operation during which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Search,
    CreateSession,
    Ask,
    AskStream,
    StreamChunk,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Search => "search",
            Operation::CreateSession => "create_answer_session",
            Operation::Ask => "ask",
            Operation::AskStream => "ask_stream",
            Operation::StreamChunk => "stream_chunk",
        };
        f.write_str(name)
    }
}

/// Why a prompt did not yield a [`crate::Query`].
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("prompt contains no user message")]
    NoUserMessage,
    #[error("last user message has no text content")]
    UnsupportedContent,
    #[error("query text is empty")]
    EmptyText,
}

/// Errors surfaced to the host.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error("invalid input: {0}")]
    InvalidInput(#[from] QueryError),
    #[error("remote service failed during {operation}: {source}")]
    RemoteService {
        operation: Operation,
        #[source]
        source: BoxError,
    },
}

impl AdapterError {
    pub fn remote(operation: Operation, source: impl Into<BoxError>) -> Self {
        AdapterError::RemoteService {
            operation,
            source: source.into(),
        }
    }

    /// Stable label for logs and wire payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            AdapterError::Configuration(_) => "configuration",
            AdapterError::InvalidInput(_) => "invalid_input",
            AdapterError::RemoteService { .. } => "remote_service",
        }
    }
}
