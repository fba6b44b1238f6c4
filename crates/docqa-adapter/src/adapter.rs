use std::sync::Arc;

use async_stream::stream;
use docqa_core::{
    AdapterConfig, AdapterError, AnswerSession, AnswerSessionConfig, AskRequest, CallOptions,
    FinishReason, Message, Operation, Query, RawCall, RemoteService, ResponseMetadata,
    ResultEnvelope, SearchMode, SearchRequest, StreamChunk, StreamResponse,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::translate;
use crate::normalize::normalize_hits;
use crate::stream::AnswerStreamBridge;
use crate::usage::estimate;

pub const PROVIDER_ID: &str = "docqa";
pub const ANSWER_MODEL_ID: &str = "docqa-answer";
pub const SEARCH_MODEL_ID: &str = "docqa-search";

/// Build an adapter over `remote`.
pub fn create_adapter(config: AdapterConfig, remote: Arc<dyn RemoteService>) -> ModelAdapter {
    ModelAdapter::new(config, remote)
}

/// Generative-model façade over the remote search-and-answer service.
///
/// Cheap to clone; clones share the configuration and the remote client.
#[derive(Clone)]
pub struct ModelAdapter {
    config: Arc<AdapterConfig>,
    remote: Arc<dyn RemoteService>,
}

impl std::fmt::Debug for ModelAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelAdapter")
            .field("endpoint", &self.config.endpoint())
            .field("model_id", &self.model_id())
            .finish_non_exhaustive()
    }
}

impl ModelAdapter {
    pub fn new(config: AdapterConfig, remote: Arc<dyn RemoteService>) -> Self {
        Self {
            config: Arc::new(config),
            remote,
        }
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn provider(&self) -> &'static str {
        PROVIDER_ID
    }

    /// Model id reported in response metadata for one-shot calls.
    pub fn model_id(&self) -> &'static str {
        if self.config.search_mode().is_some() {
            SEARCH_MODEL_ID
        } else {
            ANSWER_MODEL_ID
        }
    }

    /// One-shot call: a search when a search mode is configured, an answer
    /// otherwise.
    pub async fn generate(
        &self,
        options: impl Into<CallOptions>,
    ) -> Result<ResultEnvelope, AdapterError> {
        let options = options.into();
        let query = Query::from_prompt(&options.prompt)?;
        match self.config.search_mode() {
            Some(mode) => self.search_with_mode(&query, mode, options.signal).await,
            None => {
                let mut session =
                    open_session(self.remote.as_ref(), &self.config, Vec::new()).await?;
                ask_once(&mut *session, &self.config, &query, options.signal).await
            }
        }
    }

    /// Search regardless of the configured one-shot path. Falls back to
    /// full-text when no search mode is configured.
    pub async fn search(
        &self,
        query: &Query,
        signal: Option<CancellationToken>,
    ) -> Result<ResultEnvelope, AdapterError> {
        let mode = self.config.search_mode().unwrap_or_default();
        self.search_with_mode(query, mode, signal).await
    }

    /// Streaming call. Returns at once; all outcomes, including an unusable
    /// prompt, are reported through the stream.
    ///
    /// With a search mode configured no answer session is opened: the stream
    /// runs the search on first poll and yields the flattened hits as a
    /// single `TextDelta` (omitted when empty) followed by `Finish`. Use a
    /// configuration without a search mode to stream generated answers.
    pub fn stream(&self, options: impl Into<CallOptions>) -> StreamResponse<'static> {
        let options = options.into();
        let query = match Query::from_prompt(&options.prompt) {
            Ok(query) => query,
            Err(err) => {
                debug!(error = %err, "rejecting stream request");
                return failed_stream(err.into(), self.config.raw_settings());
            }
        };

        if let Some(mode) = self.config.search_mode() {
            let raw_call = search_raw_call(&self.config, &query, mode);
            let adapter = self.clone();
            let signal = options.signal;
            let chunks = stream! {
                match adapter.search_with_mode(&query, mode, signal).await {
                    Ok(envelope) => {
                        if !envelope.text.is_empty() {
                            yield StreamChunk::TextDelta(envelope.text);
                        }
                        yield StreamChunk::Finish {
                            finish_reason: envelope.finish_reason,
                            usage: envelope.usage,
                        };
                    }
                    Err(err) => yield StreamChunk::Error(err),
                }
            };
            return StreamResponse {
                stream: Box::pin(chunks),
                raw_call,
            };
        }

        let raw_call = answer_raw_call(&self.config, &query);
        let bridge = AnswerStreamBridge::from_config(&self.config);
        let remote = Arc::clone(&self.remote);
        let config = Arc::clone(&self.config);
        let request = AskRequest {
            term: query.to_string(),
            signal: options.signal,
        };
        let open = async move { open_session(remote.as_ref(), &config, Vec::new()).await };
        StreamResponse {
            stream: bridge.bridge(query, request, open),
            raw_call,
        }
    }

    /// Open a conversation that keeps one answer session for all its turns.
    /// `history` seeds the session; system and tool messages are left out.
    pub async fn conversation(
        &self,
        history: &[Message],
    ) -> Result<crate::Conversation, AdapterError> {
        let seed: Vec<Message> = history
            .iter()
            .filter(|m| {
                matches!(
                    m.role,
                    docqa_core::Role::User | docqa_core::Role::Assistant
                )
            })
            .cloned()
            .collect();
        let session = open_session(self.remote.as_ref(), &self.config, seed).await?;
        Ok(crate::Conversation::new(Arc::clone(&self.config), session))
    }

    async fn search_with_mode(
        &self,
        query: &Query,
        mode: SearchMode,
        signal: Option<CancellationToken>,
    ) -> Result<ResultEnvelope, AdapterError> {
        let request = SearchRequest {
            term: query.to_string(),
            mode,
            options: self.config.search_options().clone(),
            signal,
        };
        debug!(mode = mode.as_str(), "searching");
        let response = self
            .remote
            .search(request)
            .await
            .map_err(|e| translate(Operation::Search, e))?;

        let normalized = normalize_hits(response.hits);
        info!(hits = normalized.hits.len(), mode = mode.as_str(), "search completed");
        Ok(ResultEnvelope {
            usage: estimate(query.as_str(), &normalized.text),
            text: normalized.text,
            structured_results: Some(normalized.hits),
            finish_reason: FinishReason::Stop,
            raw_call: search_raw_call(&self.config, query, mode),
            response: ResponseMetadata::new(SEARCH_MODEL_ID),
        })
    }
}

pub(crate) async fn open_session(
    remote: &dyn RemoteService,
    config: &AdapterConfig,
    initial_messages: Vec<Message>,
) -> Result<Box<dyn AnswerSession>, AdapterError> {
    let session_config = AnswerSessionConfig {
        user_context: config.user_context().cloned(),
        inference_mode: config.inference_mode(),
        initial_messages,
    };
    let session = remote
        .create_answer_session(session_config)
        .await
        .map_err(|e| translate(Operation::CreateSession, e))?;
    debug!(inference_mode = config.inference_mode().as_str(), "answer session created");
    Ok(session)
}

pub(crate) async fn ask_once(
    session: &mut dyn AnswerSession,
    config: &AdapterConfig,
    query: &Query,
    signal: Option<CancellationToken>,
) -> Result<ResultEnvelope, AdapterError> {
    let answer = session
        .ask(AskRequest {
            term: query.to_string(),
            signal,
        })
        .await
        .map_err(|e| translate(Operation::Ask, e))?;
    let text = answer.into_text();
    info!(chars = text.len(), "answer received");
    Ok(ResultEnvelope {
        usage: estimate(query.as_str(), &text),
        text,
        structured_results: None,
        finish_reason: FinishReason::Stop,
        raw_call: answer_raw_call(config, query),
        response: ResponseMetadata::new(ANSWER_MODEL_ID),
    })
}

pub(crate) fn answer_raw_call(config: &AdapterConfig, query: &Query) -> RawCall {
    RawCall {
        raw_prompt: query.to_string(),
        raw_settings: config.raw_settings(),
    }
}

fn search_raw_call(config: &AdapterConfig, query: &Query, mode: SearchMode) -> RawCall {
    RawCall {
        raw_prompt: query.to_string(),
        raw_settings: json!({
            "mode": mode,
            "searchOptions": config.search_options(),
        }),
    }
}

/// A stream whose only element is `err`.
pub(crate) fn failed_stream<'a>(
    err: AdapterError,
    raw_settings: serde_json::Value,
) -> StreamResponse<'a> {
    StreamResponse {
        stream: Box::pin(futures::stream::once(async move { StreamChunk::Error(err) })),
        raw_call: RawCall {
            raw_prompt: String::new(),
            raw_settings,
        },
    }
}
