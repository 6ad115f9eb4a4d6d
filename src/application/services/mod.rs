//! Service layer: query understanding, retrieval, scoring and generation.

mod filter_extractor;
mod generator;
mod query_service;
mod retriever;
mod scorer;

#[cfg(test)]
pub(crate) mod testing;

pub use filter_extractor::{
    extract_filter, extract_filter_at, parse_brazilian_number, CatalogReader, CatalogSnapshot,
};
pub use generator::{
    build_prompt, extractive_answer, GenerationPolicy, ResponseGenerator, Sleeper, ThreadSleeper,
    NO_DATA, SAMPLE_MARKER,
};
pub use query_service::{
    CompletionEngine, EmbeddingEngine, QueryService, RecordStore, ScorerKind, ServiceConfig,
};
pub use retriever::Retriever;
pub use scorer::{cosine_similarity, Scorer};
