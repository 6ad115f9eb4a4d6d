use std::sync::Arc;

use chrono::{Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use super::filter_extractor::{extract_filter_at, CatalogReader};
use super::generator::{GenerationPolicy, ResponseGenerator, NO_DATA, SAMPLE_MARKER};
use super::retriever::Retriever;
use super::scorer::Scorer;
use crate::{
    application::dtos::{HealthStatusResponse, QueryRequest, QueryResponse},
    domain::{
        Classification, ContextItem, DomainError, InstallmentDetail, MovementDetail, Person,
        RecordQuery,
    },
};

/// Which scorer ranks the generic corpus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScorerKind {
    #[default]
    Lexical,
    Embedding,
}

/// High level configuration shared by the service and its adapters.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub embedding_model: String,
    pub structured_limit: usize,
    pub corpus_limit_per_kind: usize,
    pub top_k: usize,
    pub sample_size: usize,
    /// Score a generic corpus before resorting to the recent sample. Off by
    /// default, so a structured miss goes straight to the marked sample.
    pub corpus_scoring: bool,
    pub scorer: ScorerKind,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            embedding_model: "finrag/simple-hash".into(),
            structured_limit: 20,
            corpus_limit_per_kind: 25,
            top_k: 8,
            sample_size: 10,
            corpus_scoring: false,
            scorer: ScorerKind::Lexical,
        }
    }
}

impl ServiceConfig {
    pub fn with_model(embedding_model: impl Into<String>) -> Self {
        Self {
            embedding_model: embedding_model.into(),
            ..Self::default()
        }
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }
}

/// Abstraction over any embedding backend (hash engine, fastembed, remote API).
pub trait EmbeddingEngine: Send + Sync {
    /// Embeds every text in one call; fails as a unit.
    fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError>;

    fn dims(&self, _model: &str) -> Option<usize> {
        None
    }
}

/// Black-box text completion service.
pub trait CompletionEngine: Send + Sync {
    fn complete(&self, model: &str, prompt: &str) -> Result<String, DomainError>;
}

/// Read access to the financial records.
pub trait RecordStore: CatalogReader + Send + Sync {
    /// Movements matching the query, most recently issued first.
    fn movements(&self, query: &RecordQuery) -> Result<Vec<MovementDetail>, DomainError>;

    /// Installments matching the query, latest due date first.
    fn installments(&self, query: &RecordQuery) -> Result<Vec<InstallmentDetail>, DomainError>;

    fn persons(&self, limit: usize) -> Result<Vec<Person>, DomainError>;

    fn classifications(&self, limit: usize) -> Result<Vec<Classification>, DomainError>;

    fn ping(&self) -> Result<(), DomainError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContextOrigin {
    Structured,
    Scored,
    RecentSample,
}

/// The orchestrator: question in, grounded answer out.
pub struct QueryService {
    store: Arc<dyn RecordStore>,
    retriever: Retriever,
    scorer: Scorer,
    generator: ResponseGenerator,
    config: ServiceConfig,
}

impl QueryService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        embedder: Arc<dyn EmbeddingEngine>,
        completion: Arc<dyn CompletionEngine>,
        config: ServiceConfig,
        policy: GenerationPolicy,
    ) -> Self {
        let scorer = match config.scorer {
            ScorerKind::Lexical => Scorer::Lexical,
            ScorerKind::Embedding => Scorer::embedding(embedder, config.embedding_model()),
        };
        let generator = ResponseGenerator::new(completion, policy);
        Self::from_parts(store, scorer, generator, config)
    }

    pub fn from_parts(
        store: Arc<dyn RecordStore>,
        scorer: Scorer,
        generator: ResponseGenerator,
        config: ServiceConfig,
    ) -> Self {
        Self {
            retriever: Retriever::new(Arc::clone(&store)),
            store,
            scorer,
            generator,
            config,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn ask(&self, request: QueryRequest) -> QueryResponse {
        self.run(&request.question)
    }

    pub fn run(&self, question: &str) -> QueryResponse {
        self.run_at(question, Local::now().date_naive())
    }

    /// Runs one question with relative dates resolved against `today`.
    pub fn run_at(&self, question: &str, today: NaiveDate) -> QueryResponse {
        let question = question.trim();
        if question.is_empty() {
            warn!(target: "finrag::query", "rejected empty question");
            return QueryResponse::rejected("question cannot be empty");
        }

        let query_id = Uuid::new_v4();
        let span = info_span!(target: "finrag::query", "query", %query_id);
        let _entered = span.enter();

        let filter = extract_filter_at(question, self.store.as_ref(), today);

        let mut origin = ContextOrigin::Structured;
        let mut items = self.retriever.retrieve(&filter, self.config.structured_limit);

        if items.is_empty() && self.config.corpus_scoring {
            let corpus = self
                .retriever
                .build_generic_corpus(self.config.corpus_limit_per_kind, &filter);
            items = self.scorer.score(question, &corpus, self.config.top_k);
            origin = ContextOrigin::Scored;
        }

        if items.is_empty() {
            items = self.retriever.sample_recent(self.config.sample_size);
            origin = ContextOrigin::RecentSample;
        }

        let lines: Vec<String> = items.iter().map(ContextItem::line).collect();
        let context_text = render_context(&lines, origin == ContextOrigin::RecentSample);
        debug!(
            target: "finrag::query",
            ?origin,
            lines = lines.len(),
            "context assembled"
        );

        let answer = self.generator.generate(question, &context_text);
        info!(target: "finrag::query", ?origin, "question answered");

        QueryResponse::answered(answer, lines)
    }

    pub fn health(&self) -> Result<HealthStatusResponse, DomainError> {
        self.store.ping()?;

        Ok(HealthStatusResponse {
            ok: true,
            message: "ready".into(),
            details: Some(format!(
                "scorer: {}, model: {}, checked_at: {}",
                self.scorer.name(),
                self.generator.policy().primary_model,
                Utc::now()
            )),
        })
    }
}

/// Joins context lines for the prompt. A recent sample gets the marker line
/// on top; no lines at all renders as the no-data placeholder.
fn render_context(lines: &[String], is_sample: bool) -> String {
    if lines.is_empty() {
        return NO_DATA.to_string();
    }
    let body = lines.join("\n");
    if is_sample {
        format!("{SAMPLE_MARKER}\n{body}")
    } else {
        body
    }
}
