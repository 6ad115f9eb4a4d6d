//! Infrastructure layer wiring concrete adapters (storage, embeddings, model APIs).

pub mod embeddings;
pub mod http_client;
pub mod storage;

#[cfg(feature = "fastembed-engine")]
pub use embeddings::FastEmbedEngine;
pub use embeddings::{RemoteEmbeddingEngine, SimpleEmbedEngine, SIMPLE_MODEL};
pub use http_client::{GeminiCompletionClient, DEFAULT_GEMINI_API_BASE};
pub use storage::{ImportSummary, SledRecordStore};
