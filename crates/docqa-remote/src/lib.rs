//! HTTP client for the document search-and-answer service.

mod error;
mod session;
mod wire;

use std::future::Future;

use async_trait::async_trait;
use docqa_core::{
    AccumulationPolicy, AdapterConfig, AnswerSession, AnswerSessionConfig, BoxError,
    RemoteService, SearchRequest, SearchResponse,
};
use reqwest::{RequestBuilder, Response};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub use error::ClientError;
pub use session::HttpAnswerSession;

use wire::SearchBody;

/// Client for the service's `/search` and `/answer` endpoints.
#[derive(Clone)]
pub struct HttpRemoteClient {
    http: reqwest::Client,
    endpoint: String,
    credential: String,
    source_chunks: AccumulationPolicy,
}

impl std::fmt::Debug for HttpRemoteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRemoteClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl HttpRemoteClient {
    pub fn new(config: &AdapterConfig) -> Self {
        Self::with_http(reqwest::Client::new(), config)
    }

    /// Use a preconfigured `reqwest` client (timeouts, proxies).
    pub fn with_http(http: reqwest::Client, config: &AdapterConfig) -> Self {
        Self {
            http,
            endpoint: config.endpoint().to_string(),
            credential: config.credential().to_string(),
            source_chunks: config.source_chunks(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Run a search and return the ranked hits.
    pub async fn search_hits(
        &self,
        request: &SearchRequest,
    ) -> Result<SearchResponse, ClientError> {
        let body = SearchBody::new(&request.term, request.mode, request.options.clone());
        let resp = checked(self.post("search").json(&body).send().await?).await?;
        let body = resp.json::<SearchResponse>().await?;
        debug!(hits = body.hits.len(), "search response decoded");
        Ok(body)
    }

    pub(crate) fn post(&self, path: &str) -> RequestBuilder {
        self.http
            .post(format!("{}/{path}", self.endpoint))
            .bearer_auth(&self.credential)
    }
}

#[async_trait]
impl RemoteService for HttpRemoteClient {
    async fn search(&self, request: SearchRequest) -> Result<SearchResponse, BoxError> {
        let resp = cancellable(request.signal.as_ref(), self.search_hits(&request)).await?;
        Ok(resp)
    }

    async fn create_answer_session(
        &self,
        config: AnswerSessionConfig,
    ) -> Result<Box<dyn AnswerSession>, BoxError> {
        let session = HttpAnswerSession::new(self.clone(), config);
        debug!(conversation_id = %session.conversation_id(), "answer session opened");
        Ok(Box::new(session))
    }
}

/// Turn a non-success status into [`ClientError::Http`].
pub(crate) async fn checked(resp: Response) -> Result<Response, ClientError> {
    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        warn!(%status, "service returned an error status");
        return Err(ClientError::Http { status, text });
    }
    Ok(resp)
}

/// Race `fut` against the caller's signal.
pub(crate) async fn cancellable<T, F>(
    signal: Option<&CancellationToken>,
    fut: F,
) -> Result<T, ClientError>
where
    F: Future<Output = Result<T, ClientError>>,
{
    match signal {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(ClientError::Cancelled),
            res = fut => res,
        },
        None => fut.await,
    }
}
