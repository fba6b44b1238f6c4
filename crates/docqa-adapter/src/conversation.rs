use std::sync::Arc;

use docqa_core::{
    AdapterConfig, AdapterError, AnswerSession, AskRequest, CallOptions, Query, ResultEnvelope,
    StreamResponse,
};
use tracing::debug;
use uuid::Uuid;

use crate::adapter::{answer_raw_call, ask_once, failed_stream};
use crate::stream::AnswerStreamBridge;

/// A multi-turn exchange backed by a single answer session.
///
/// Calls take `&mut self`, so the session is never used by two calls at
/// once. Dropping the conversation discards the session.
pub struct Conversation {
    id: Uuid,
    config: Arc<AdapterConfig>,
    session: Box<dyn AnswerSession>,
    turns: usize,
}

impl Conversation {
    pub(crate) fn new(config: Arc<AdapterConfig>, session: Box<dyn AnswerSession>) -> Self {
        let id = Uuid::new_v4();
        debug!(%id, "conversation started");
        Self {
            id,
            config,
            session,
            turns: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Number of calls made so far, successful or not.
    pub fn turns(&self) -> usize {
        self.turns
    }

    pub async fn generate(
        &mut self,
        options: impl Into<CallOptions>,
    ) -> Result<ResultEnvelope, AdapterError> {
        let options = options.into();
        let query = Query::from_prompt(&options.prompt)?;
        self.turns += 1;
        ask_once(&mut *self.session, &self.config, &query, options.signal).await
    }

    /// Stream the next answer in this conversation. The session stays
    /// borrowed until the returned stream is dropped.
    pub fn stream(&mut self, options: impl Into<CallOptions>) -> StreamResponse<'_> {
        let options = options.into();
        let query = match Query::from_prompt(&options.prompt) {
            Ok(query) => query,
            Err(err) => return failed_stream(err.into(), self.config.raw_settings()),
        };
        self.turns += 1;

        let raw_call = answer_raw_call(&self.config, &query);
        let bridge = AnswerStreamBridge::from_config(&self.config);
        let request = AskRequest {
            term: query.to_string(),
            signal: options.signal,
        };
        let open = std::future::ready(Ok::<_, AdapterError>(&mut *self.session));
        StreamResponse {
            stream: bridge.bridge(query, request, open),
            raw_call,
        }
    }
}

impl std::fmt::Debug for Conversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conversation")
            .field("id", &self.id)
            .field("turns", &self.turns)
            .finish_non_exhaustive()
    }
}
