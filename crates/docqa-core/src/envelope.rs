use std::fmt;

use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::AdapterError;
use crate::remote::Hit;

/// Token-like counters reported with every result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_units: u64,
    pub completion_units: u64,
    pub total_units: u64,
}

impl Usage {
    pub fn new(prompt_units: u64, completion_units: u64) -> Self {
        Self {
            prompt_units,
            completion_units,
            total_units: prompt_units + completion_units,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    Stop,
    Error,
}

/// What was sent to the remote service, for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCall {
    pub raw_prompt: String,
    pub raw_settings: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub model_id: String,
}

impl ResponseMetadata {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            model_id: model_id.into(),
        }
    }
}

/// Normalized result of a one-shot call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub text: String,
    /// Present only on the search path, in the order the service returned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_results: Option<Vec<Hit>>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    pub raw_call: RawCall,
    pub response: ResponseMetadata,
}

/// One element of a streamed answer.
///
/// A well-formed stream is zero or more `TextDelta`s followed by exactly one
/// `Finish` or `Error`.
#[derive(Debug)]
pub enum StreamChunk {
    TextDelta(String),
    Finish {
        finish_reason: FinishReason,
        usage: Usage,
    },
    Error(AdapterError),
}

impl StreamChunk {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamChunk::TextDelta(_))
    }
}

impl fmt::Display for StreamChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamChunk::TextDelta(text) => write!(f, "text-delta({text:?})"),
            StreamChunk::Finish { finish_reason, .. } => write!(f, "finish({finish_reason:?})"),
            StreamChunk::Error(err) => write!(f, "error({err})"),
        }
    }
}

/// Handle returned by the streaming operation. All outcomes, including
/// failures, arrive through `stream`.
pub struct StreamResponse<'a> {
    pub stream: BoxStream<'a, StreamChunk>,
    pub raw_call: RawCall,
}

impl fmt::Debug for StreamResponse<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamResponse")
            .field("raw_call", &self.raw_call)
            .finish_non_exhaustive()
    }
}
