use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use docqa_core::{
    AccumulationPolicy, Answer, AnswerSession, AnswerSessionConfig, AskRequest, BoxError,
    InferenceMode, RemoteChunkStream, UserContext,
};
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::wire::{chunk_text, parse_chunk, AnswerBody, WireMessage, DONE};
use crate::{cancellable, checked, ClientError, HttpRemoteClient};

type History = Arc<Mutex<Vec<WireMessage>>>;

/// One conversation with the answer endpoint.
///
/// Completed turns are kept and replayed as `messages` on the next ask.
pub struct HttpAnswerSession {
    client: HttpRemoteClient,
    conversation_id: Uuid,
    user_context: Option<UserContext>,
    inference_mode: InferenceMode,
    history: History,
    in_flight: Option<CancellationToken>,
}

impl HttpAnswerSession {
    pub fn new(client: HttpRemoteClient, config: AnswerSessionConfig) -> Self {
        let history = config.initial_messages.iter().map(WireMessage::from).collect();
        Self {
            client,
            conversation_id: Uuid::new_v4(),
            user_context: config.user_context,
            inference_mode: config.inference_mode,
            history: Arc::new(Mutex::new(history)),
            in_flight: None,
        }
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    /// Number of messages that will be replayed on the next ask.
    pub fn history_len(&self) -> usize {
        lock(&self.history).len()
    }

    async fn send(&self, query: &str, stream: bool) -> Result<reqwest::Response, ClientError> {
        let body = AnswerBody {
            conversation_id: self.conversation_id,
            query,
            user_context: self.user_context.as_ref(),
            inference_type: self.inference_mode,
            messages: lock(&self.history).clone(),
            stream,
        };
        let resp = self.client.post("answer").json(&body).send().await?;
        checked(resp).await
    }
}

fn lock(history: &History) -> std::sync::MutexGuard<'_, Vec<WireMessage>> {
    history.lock().unwrap_or_else(PoisonError::into_inner)
}

fn record_turn(history: &History, query: String, answer: String) {
    let mut history = lock(history);
    history.push(WireMessage::user(query));
    history.push(WireMessage::assistant(answer));
}

enum Step {
    Aborted,
    Cancelled,
    Event(Option<Result<Event, EventStreamError<reqwest::Error>>>),
}

async fn wait(signal: Option<&CancellationToken>) {
    match signal {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

#[async_trait]
impl AnswerSession for HttpAnswerSession {
    async fn ask(&mut self, request: AskRequest) -> Result<Answer, BoxError> {
        let answer = cancellable(request.signal.as_ref(), async {
            let resp = self.send(&request.term, false).await?;
            Ok::<_, ClientError>(resp.json::<Answer>().await?)
        })
        .await?;
        record_turn(&self.history, request.term, answer.clone().into_text());
        Ok(answer)
    }

    async fn ask_stream(&mut self, request: AskRequest) -> Result<RemoteChunkStream, BoxError> {
        let abort = CancellationToken::new();
        self.in_flight = Some(abort.clone());
        let resp = cancellable(request.signal.as_ref(), self.send(&request.term, true)).await?;
        info!(conversation_id = %self.conversation_id, "answer stream opened");

        let history = Arc::clone(&self.history);
        let source = self.client.source_chunks;
        let AskRequest { term, signal } = request;
        let chunks = async_stream::stream! {
            let mut events = Box::pin(resp.bytes_stream().eventsource());
            let mut answer = String::new();
            loop {
                let step = tokio::select! {
                    biased;
                    _ = abort.cancelled() => Step::Aborted,
                    _ = wait(signal.as_ref()) => Step::Cancelled,
                    event = events.next() => Step::Event(event),
                };
                match step {
                    Step::Aborted => {
                        debug!("answer stream aborted");
                        return;
                    }
                    Step::Cancelled => {
                        yield Err(BoxError::from(ClientError::Cancelled));
                        return;
                    }
                    Step::Event(None) => break,
                    Step::Event(Some(Err(err))) => {
                        yield Err(BoxError::from(ClientError::Stream(err.to_string())));
                        return;
                    }
                    Step::Event(Some(Ok(event))) => {
                        if event.data == DONE {
                            break;
                        }
                        if event.data.is_empty() {
                            continue;
                        }
                        let chunk = parse_chunk(&event.data);
                        if let Some(text) = chunk_text(&chunk) {
                            match source {
                                AccumulationPolicy::WholeSoFar => answer = text,
                                AccumulationPolicy::Delta => answer.push_str(&text),
                            }
                        }
                        yield Ok(chunk);
                    }
                }
            }
            record_turn(&history, term, answer);
        };
        Ok(Box::pin(chunks))
    }

    fn abort(&mut self) {
        if let Some(token) = self.in_flight.take() {
            debug!(conversation_id = %self.conversation_id, "aborting answer");
            token.cancel();
        }
    }
}
