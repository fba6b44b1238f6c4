//! Host-facing generative-model adapter for a remote document search and
//! answer service.
//!
//! [`ModelAdapter`] exposes `generate` (one-shot) and `stream` (incremental)
//! and normalizes both search hits and streamed answers into the envelope
//! and chunk types of [`docqa_core`].

mod adapter;
mod conversation;
pub mod errors;
pub mod normalize;
pub mod stream;
pub mod usage;

pub use adapter::{create_adapter, ModelAdapter, ANSWER_MODEL_ID, PROVIDER_ID, SEARCH_MODEL_ID};
pub use conversation::Conversation;
pub use errors::MalformedChunk;
pub use normalize::{normalize_hits, NormalizedResults, NO_RESULTS};
pub use stream::{Accumulator, AnswerStreamBridge};
