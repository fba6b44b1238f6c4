//! Bridge from a remote answer stream to the host's chunk protocol.

use std::future::Future;
use std::ops::DerefMut;

use async_stream::stream;
use docqa_core::{
    AccumulationPolicy, AdapterConfig, AdapterError, AnswerSession, AskRequest, BoxError,
    FinishReason, Operation, Query, RemoteChunkStream, StreamChunk,
};
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{translate, MalformedChunk};
use crate::usage::estimate;

/// Tracks the answer text seen so far and turns each incoming chunk into the
/// text to emit.
#[derive(Debug)]
pub struct Accumulator {
    emit: AccumulationPolicy,
    source: AccumulationPolicy,
    text: String,
}

impl Accumulator {
    pub fn new(emit: AccumulationPolicy, source: AccumulationPolicy) -> Self {
        Self {
            emit,
            source,
            text: String::new(),
        }
    }

    /// Absorb one chunk and return what should be emitted for it.
    pub fn push(&mut self, chunk: &str) -> String {
        let fragment = match self.source {
            AccumulationPolicy::Delta => {
                self.text.push_str(chunk);
                chunk.to_string()
            }
            AccumulationPolicy::WholeSoFar => {
                let fragment = match chunk.strip_prefix(self.text.as_str()) {
                    Some(rest) => rest.to_string(),
                    None => {
                        warn!(
                            previous_len = self.text.len(),
                            "answer chunk does not extend the text so far, restarting"
                        );
                        chunk.to_string()
                    }
                };
                self.text = chunk.to_string();
                fragment
            }
        };
        match self.emit {
            AccumulationPolicy::Delta => fragment,
            AccumulationPolicy::WholeSoFar => self.text.clone(),
        }
    }

    /// Full answer text accumulated so far.
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Read a raw chunk as text. `Ok(None)` means the chunk carries nothing.
pub fn coerce_chunk(raw: &Value) -> Result<Option<String>, MalformedChunk> {
    match raw {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Bool(_) | Value::Number(_) => Ok(Some(raw.to_string())),
        Value::Object(fields) => fields
            .get("text")
            .or_else(|| fields.get("message"))
            .and_then(Value::as_str)
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| MalformedChunk(raw.to_string())),
        Value::Array(_) => Err(MalformedChunk(raw.to_string())),
    }
}

/// Owns a live answer: the session and, once subscribed, its chunks.
///
/// Dropping it before [`LiveAnswer::release`] aborts the session, also
/// while `ask_stream` is still pending.
struct LiveAnswer<S>
where
    S: DerefMut + Send,
    S::Target: AnswerSession,
{
    session: S,
    chunks: Option<RemoteChunkStream>,
    released: bool,
}

impl<S> LiveAnswer<S>
where
    S: DerefMut + Send,
    S::Target: AnswerSession,
{
    fn new(session: S) -> Self {
        Self {
            session,
            chunks: None,
            released: false,
        }
    }

    async fn subscribe(&mut self, request: AskRequest) -> Result<(), BoxError> {
        self.chunks = Some(self.session.ask_stream(request).await?);
        Ok(())
    }

    async fn next(&mut self) -> Option<Result<Value, BoxError>> {
        match self.chunks.as_mut() {
            Some(chunks) => chunks.next().await,
            None => None,
        }
    }

    fn release(mut self) {
        self.released = true;
    }
}

impl<S> Drop for LiveAnswer<S>
where
    S: DerefMut + Send,
    S::Target: AnswerSession,
{
    fn drop(&mut self) {
        self.chunks = None;
        if !self.released {
            debug!("answer stream dropped before its terminal chunk, aborting session");
            self.session.abort();
        }
    }
}

/// Converts a session's chunk stream into [`StreamChunk`]s.
///
/// Guarantees: chunks keep their arrival order, the sequence ends with
/// exactly one `Finish` or `Error`, and nothing is produced after it.
#[derive(Debug, Clone, Copy)]
pub struct AnswerStreamBridge {
    emit: AccumulationPolicy,
    source: AccumulationPolicy,
}

impl AnswerStreamBridge {
    pub fn new(emit: AccumulationPolicy, source: AccumulationPolicy) -> Self {
        Self { emit, source }
    }

    pub fn from_config(config: &AdapterConfig) -> Self {
        Self::new(config.stream_policy(), config.source_chunks())
    }

    /// Ask `request` on the session produced by `open` and bridge the answer.
    ///
    /// `open` is only polled once the returned stream is, so no session is
    /// opened for a stream nobody reads.
    pub fn bridge<'a, S, F>(
        self,
        query: Query,
        request: AskRequest,
        open: F,
    ) -> BoxStream<'a, StreamChunk>
    where
        S: DerefMut + Send + 'a,
        S::Target: AnswerSession,
        F: Future<Output = Result<S, AdapterError>> + Send + 'a,
    {
        let Self { emit, source } = self;
        let chunks = stream! {
            let session = match open.await {
                Ok(session) => session,
                Err(err) => {
                    yield StreamChunk::Error(err);
                    return;
                }
            };
            let mut live = LiveAnswer::new(session);
            if let Err(cause) = live.subscribe(request).await {
                live.release();
                yield StreamChunk::Error(translate(Operation::AskStream, cause));
                return;
            }
            debug!(?emit, ?source, "answer stream opened");

            let mut acc = Accumulator::new(emit, source);
            let mut deltas = 0usize;
            let terminal = loop {
                match live.next().await {
                    Some(Ok(raw)) => match coerce_chunk(&raw) {
                        Ok(Some(text)) => {
                            deltas += 1;
                            yield StreamChunk::TextDelta(acc.push(&text));
                        }
                        Ok(None) => {}
                        Err(malformed) => {
                            break StreamChunk::Error(translate(
                                Operation::StreamChunk,
                                Box::new(malformed),
                            ));
                        }
                    },
                    Some(Err(cause)) => {
                        break StreamChunk::Error(translate(Operation::AskStream, cause));
                    }
                    None => {
                        break StreamChunk::Finish {
                            finish_reason: FinishReason::Stop,
                            usage: estimate(query.as_str(), acc.text()),
                        };
                    }
                }
            };
            live.release();
            debug!(deltas, terminal = %terminal, "answer stream finished");
            yield terminal;
        };
        Box::pin(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn push_all(acc: &mut Accumulator, chunks: &[&str]) -> Vec<String> {
        chunks.iter().map(|c| acc.push(c)).collect()
    }

    #[test]
    fn cumulative_source_emitted_whole_so_far() {
        let mut acc =
            Accumulator::new(AccumulationPolicy::WholeSoFar, AccumulationPolicy::WholeSoFar);
        assert_eq!(push_all(&mut acc, &["Hel", "Hello"]), vec!["Hel", "Hello"]);
        assert_eq!(acc.text(), "Hello");
    }

    #[test]
    fn cumulative_source_emitted_as_deltas() {
        let mut acc = Accumulator::new(AccumulationPolicy::Delta, AccumulationPolicy::WholeSoFar);
        assert_eq!(
            push_all(&mut acc, &["Hel", "Hello", "Hello!"]),
            vec!["Hel", "lo", "!"]
        );
        assert_eq!(acc.text(), "Hello!");
    }

    #[test]
    fn delta_source_emitted_whole_so_far() {
        let mut acc = Accumulator::new(AccumulationPolicy::WholeSoFar, AccumulationPolicy::Delta);
        assert_eq!(push_all(&mut acc, &["ha", "ha"]), vec!["ha", "haha"]);
    }

    #[test]
    fn delta_source_emitted_as_deltas() {
        let mut acc = Accumulator::new(AccumulationPolicy::Delta, AccumulationPolicy::Delta);
        assert_eq!(push_all(&mut acc, &["a", "b", "c"]), vec!["a", "b", "c"]);
        assert_eq!(acc.text(), "abc");
    }

    #[test]
    fn cumulative_source_that_rewrites_restarts() {
        let mut acc = Accumulator::new(AccumulationPolicy::Delta, AccumulationPolicy::WholeSoFar);
        assert_eq!(push_all(&mut acc, &["Hello", "Goodbye"]), vec!["Hello", "Goodbye"]);
        assert_eq!(acc.text(), "Goodbye");
    }

    #[test]
    fn coerces_chunk_shapes() {
        assert_eq!(coerce_chunk(&json!("hi")).unwrap().as_deref(), Some("hi"));
        assert_eq!(coerce_chunk(&json!(42)).unwrap().as_deref(), Some("42"));
        assert_eq!(
            coerce_chunk(&json!({"text": "t"})).unwrap().as_deref(),
            Some("t")
        );
        assert_eq!(
            coerce_chunk(&json!({"message": "m"})).unwrap().as_deref(),
            Some("m")
        );
        assert_eq!(coerce_chunk(&Value::Null).unwrap(), None);
        assert!(coerce_chunk(&json!({"other": 1})).is_err());
        assert!(coerce_chunk(&json!(["a"])).is_err());
    }
}
