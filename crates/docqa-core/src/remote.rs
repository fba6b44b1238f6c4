//! Interface of the remote search-and-answer service.
//!
//! The adapter only talks to the service through these traits; transport,
//! retries and ranking all live behind them.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::config::{InferenceMode, SearchMode, SearchOptions, UserContext};
use crate::error::BoxError;
use crate::prompt::Message;

/// One ranked document returned by a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub document: Map<String, Value>,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub hits: Vec<Hit>,
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub term: String,
    pub mode: SearchMode,
    pub options: SearchOptions,
    pub signal: Option<CancellationToken>,
}

#[derive(Debug, Clone, Default)]
pub struct AnswerSessionConfig {
    pub user_context: Option<UserContext>,
    pub inference_mode: InferenceMode,
    /// Earlier turns of the conversation, oldest first.
    pub initial_messages: Vec<Message>,
}

#[derive(Debug, Clone)]
pub struct AskRequest {
    pub term: String,
    pub signal: Option<CancellationToken>,
}

/// One-shot answer: services reply with either a bare string or an object
/// carrying the text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Text(String),
    Message {
        #[serde(default)]
        text: Option<String>,
    },
}

impl Answer {
    pub fn into_text(self) -> String {
        match self {
            Answer::Text(text) => text,
            Answer::Message { text } => text.unwrap_or_default(),
        }
    }
}

/// Raw chunks of a streamed answer, in arrival order.
pub type RemoteChunkStream = BoxStream<'static, Result<Value, BoxError>>;

#[async_trait]
pub trait RemoteService: Send + Sync {
    async fn search(&self, request: SearchRequest) -> Result<SearchResponse, BoxError>;

    async fn create_answer_session(
        &self,
        config: AnswerSessionConfig,
    ) -> Result<Box<dyn AnswerSession>, BoxError>;
}

#[async_trait]
pub trait AnswerSession: Send {
    async fn ask(&mut self, request: AskRequest) -> Result<Answer, BoxError>;

    async fn ask_stream(&mut self, request: AskRequest) -> Result<RemoteChunkStream, BoxError>;

    /// Stop any answer currently being produced. Called when the consumer
    /// loses interest before the stream ends.
    fn abort(&mut self) {}
}
