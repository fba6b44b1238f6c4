//! Translation of remote-service failures into [`AdapterError`].
//!
//! Collaborator errors only ever leave the adapter wrapped in
//! [`AdapterError::RemoteService`].

use docqa_core::{AdapterError, BoxError, Operation};
use thiserror::Error;
use tracing::error;

/// A streamed chunk that could not be read as text.
#[derive(Debug, Error)]
#[error("malformed answer chunk: {0}")]
pub struct MalformedChunk(pub String);

pub(crate) fn translate(operation: Operation, cause: BoxError) -> AdapterError {
    error!(%operation, error = %cause, "remote service call failed");
    AdapterError::remote(operation, cause)
}
