mod config;

use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::{Arc, OnceLock},
};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use docqa_adapter::{ModelAdapter, create_adapter};
use docqa_core::{
    AdapterError, ConfigResolver, Message, Query, ResultEnvelope, StreamChunk,
};
use docqa_remote::HttpRemoteClient;
use futures::{Stream, StreamExt};
use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub use config::{
    CONFIG_PATH_VAR, DEFAULT_CONFIG_PATH, ListenConfig, ServerConfig, ServerConfigError,
};

static METRICS: OnceLock<PrometheusHandle> = OnceLock::new();

#[derive(Clone)]
pub struct AppState {
    pub adapter: ModelAdapter,
    pub metrics: PrometheusHandle,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/generate", post(generate))
        .route("/v1/stream", post(stream))
        .route("/v1/search", post(search))
        .route("/healthz", get(health))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}

/// Maps adapter failures onto HTTP statuses.
pub struct ApiError(AdapterError);

impl From<AdapterError> for ApiError {
    fn from(err: AdapterError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AdapterError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AdapterError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AdapterError::RemoteService { .. } => StatusCode::BAD_GATEWAY,
        };
        counter!("errors_total", 1, "kind" => self.0.kind());
        warn!(%status, error = %self.0, "request failed");
        let body = ErrorBody {
            error: self.0.to_string(),
            kind: self.0.kind().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

async fn generate(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<ResultEnvelope>, ApiError> {
    counter!("requests_total", 1, "endpoint" => "generate");
    let envelope = state.adapter.generate(req.messages).await?;
    Ok(Json(envelope))
}

async fn stream(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    counter!("requests_total", 1, "endpoint" => "stream");
    let response = state.adapter.stream(req.messages);
    let events = response.stream.map(|chunk| Ok(chunk_event(chunk)));
    Sse::new(events).keep_alive(KeepAlive::default())
}

/// One SSE event per chunk: `text-delta`, `finish` or `error`.
fn chunk_event(chunk: StreamChunk) -> Event {
    match chunk {
        StreamChunk::TextDelta(text) => Event::default().event("text-delta").data(text),
        StreamChunk::Finish {
            finish_reason,
            usage,
        } => Event::default()
            .event("finish")
            .data(json!({"finishReason": finish_reason, "usage": usage}).to_string()),
        StreamChunk::Error(err) => {
            counter!("errors_total", 1, "kind" => err.kind());
            Event::default()
                .event("error")
                .data(json!({"error": err.to_string(), "kind": err.kind()}).to_string())
        }
    }
}

async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchQuery>,
) -> Result<Json<ResultEnvelope>, ApiError> {
    counter!("requests_total", 1, "endpoint" => "search");
    let query = Query::new(req.query).map_err(AdapterError::from)?;
    let envelope = state.adapter.search(&query, None).await?;
    Ok(Json(envelope))
}

async fn health() -> &'static str {
    "ok"
}

async fn metrics_endpoint(State(state): State<AppState>) -> String {
    state.metrics.render()
}

fn metrics_handle() -> Result<PrometheusHandle, Box<dyn std::error::Error>> {
    if let Some(handle) = METRICS.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(METRICS.get_or_init(|| handle).clone())
}

/// Resolve the adapter configuration, bind and serve in the background.
pub async fn start(
    cfg: ServerConfig,
) -> Result<(SocketAddr, JoinHandle<()>), Box<dyn std::error::Error>> {
    let metrics = metrics_handle()?;
    let adapter_config = ConfigResolver::new().resolve_from_env(cfg.adapter)?;
    let remote = Arc::new(HttpRemoteClient::new(&adapter_config));
    let adapter = create_adapter(adapter_config, remote);
    info!(endpoint = adapter.config().endpoint(), model = adapter.model_id(), "adapter ready");

    let app = router(AppState { adapter, metrics });
    let listener = TcpListener::bind(("0.0.0.0", cfg.server.port)).await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            error!(%err, "server stopped");
        }
    });
    info!("listening on {}", addr);
    Ok((addr, handle))
}
