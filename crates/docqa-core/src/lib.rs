//! Shared types for the docqa adapter: configuration, the host-facing data
//! model, the error taxonomy and the interface of the remote service.

pub mod config;
pub mod envelope;
pub mod error;
pub mod prompt;
pub mod query;
pub mod remote;

pub use config::{
    AccumulationPolicy, AdapterConfig, ConfigError, ConfigOptions, ConfigResolver, EnvFallbacks,
    InferenceMode, SearchMode, SearchOptions, SortBy, SortOrder, UserContext,
};
pub use envelope::{
    FinishReason, RawCall, ResponseMetadata, ResultEnvelope, StreamChunk, StreamResponse, Usage,
};
pub use error::{AdapterError, BoxError, Operation, QueryError};
pub use prompt::{CallOptions, Content, ContentPart, Message, Role};
pub use query::Query;
pub use remote::{
    Answer, AnswerSession, AnswerSessionConfig, AskRequest, Hit, RemoteChunkStream,
    RemoteService, SearchRequest, SearchResponse,
};
