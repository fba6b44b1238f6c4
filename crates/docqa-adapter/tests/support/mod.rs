//! In-memory remote service used by the adapter tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docqa_core::{
    AdapterConfig, Answer, AnswerSession, AnswerSessionConfig, AskRequest, BoxError,
    ConfigOptions, ConfigResolver, Hit, RemoteChunkStream, RemoteService, SearchRequest,
    SearchResponse,
};
use futures::StreamExt;
use serde_json::Value;

pub fn config(options: ConfigOptions) -> AdapterConfig {
    ConfigResolver::without_env()
        .resolve(
            options.with_endpoint("https://x").with_credential("k"),
            |_| None,
        )
        .expect("config")
}

pub fn hit(document: Value, score: f64) -> Hit {
    Hit {
        document: document.as_object().cloned().expect("object document"),
        score,
    }
}

/// Observes what the fake sessions did.
#[derive(Clone, Default)]
pub struct Probe {
    pub calls: Arc<Mutex<Vec<String>>>,
    pub sessions: Arc<AtomicUsize>,
    pub pulled: Arc<AtomicUsize>,
    pub streaming: Arc<AtomicBool>,
    pub aborted: Arc<AtomicBool>,
}

impl Probe {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[derive(Default)]
pub struct FakeRemote {
    pub hits: Vec<Hit>,
    pub search_error: Option<String>,
    pub session_error: Option<String>,
    pub answer: Option<Answer>,
    pub chunks: Vec<Result<Value, String>>,
    /// `ask_stream` never resolves.
    pub stall_stream: bool,
    pub probe: Probe,
}

#[async_trait]
impl RemoteService for FakeRemote {
    async fn search(&self, request: SearchRequest) -> Result<SearchResponse, BoxError> {
        self.probe
            .record(format!("search:{}:{}", request.mode.as_str(), request.term));
        if let Some(err) = &self.search_error {
            return Err(err.clone().into());
        }
        Ok(SearchResponse {
            hits: self.hits.clone(),
        })
    }

    async fn create_answer_session(
        &self,
        config: AnswerSessionConfig,
    ) -> Result<Box<dyn AnswerSession>, BoxError> {
        self.probe
            .record(format!("session:{}", config.initial_messages.len()));
        if let Some(err) = &self.session_error {
            return Err(err.clone().into());
        }
        self.probe.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            answer: self
                .answer
                .clone()
                .unwrap_or_else(|| Answer::Text(String::new())),
            chunks: self.chunks.clone(),
            stall_stream: self.stall_stream,
            probe: self.probe.clone(),
        }))
    }
}

struct FakeSession {
    answer: Answer,
    chunks: Vec<Result<Value, String>>,
    stall_stream: bool,
    probe: Probe,
}

/// Clears the `streaming` flag once the chunk stream is dropped.
struct StreamingGuard(Arc<AtomicBool>);

impl StreamingGuard {
    fn hold(&self) {}
}

impl Drop for StreamingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl AnswerSession for FakeSession {
    async fn ask(&mut self, request: AskRequest) -> Result<Answer, BoxError> {
        self.probe.record(format!("ask:{}", request.term));
        Ok(self.answer.clone())
    }

    async fn ask_stream(&mut self, request: AskRequest) -> Result<RemoteChunkStream, BoxError> {
        self.probe.record(format!("ask_stream:{}", request.term));
        if self.stall_stream {
            futures::future::pending::<()>().await;
        }
        self.probe.streaming.store(true, Ordering::SeqCst);
        let guard = StreamingGuard(self.probe.streaming.clone());
        let pulled = self.probe.pulled.clone();
        let chunks = futures::stream::iter(self.chunks.clone()).map(move |chunk| {
            guard.hold();
            pulled.fetch_add(1, Ordering::SeqCst);
            chunk.map_err(BoxError::from)
        });
        Ok(Box::pin(chunks))
    }

    fn abort(&mut self) {
        self.probe.aborted.store(true, Ordering::SeqCst);
    }
}
