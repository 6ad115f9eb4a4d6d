use std::sync::Arc;

use tracing::{debug, warn};

use super::EmbeddingEngine;
use crate::domain::{ContextItem, DomainError, ScoredItem};

/// Tokens this short carry no signal for containment scoring.
const MIN_TOKEN_CHARS: usize = 3;

/// Ranks a corpus against a question.
///
/// Both strategies return items in descending score order, drop anything
/// scoring zero or below and keep at most `top_k`. The embedding strategy
/// never fails outward: when the engine errors it scores lexically instead.
#[derive(Clone)]
pub enum Scorer {
    Lexical,
    Embedding {
        engine: Arc<dyn EmbeddingEngine>,
        model: String,
    },
}

impl Scorer {
    pub fn embedding(engine: Arc<dyn EmbeddingEngine>, model: impl Into<String>) -> Self {
        Self::Embedding {
            engine,
            model: model.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Scorer::Lexical => "lexical",
            Scorer::Embedding { .. } => "embedding",
        }
    }

    pub fn score(&self, question: &str, corpus: &[ContextItem], top_k: usize) -> Vec<ContextItem> {
        if corpus.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let scored = match self {
            Scorer::Lexical => lexical_scores(question, corpus),
            Scorer::Embedding { engine, model } => {
                match embedding_scores(engine.as_ref(), model, question, corpus) {
                    Ok(scored) => scored,
                    Err(err) => {
                        warn!(
                            target: "finrag::scoring",
                            error = %err,
                            "embedding scoring failed; falling back to lexical scoring"
                        );
                        lexical_scores(question, corpus)
                    }
                }
            }
        };

        let ranked = rank(scored, top_k);
        debug!(
            target: "finrag::scoring",
            strategy = self.name(),
            corpus = corpus.len(),
            kept = ranked.len(),
            "scored corpus"
        );
        ranked
    }
}

impl std::fmt::Debug for Scorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scorer::Lexical => f.write_str("Lexical"),
            Scorer::Embedding { model, .. } => {
                f.debug_struct("Embedding").field("model", model).finish()
            }
        }
    }
}

fn rank(mut scored: Vec<ScoredItem>, top_k: usize) -> Vec<ContextItem> {
    scored.retain(|entry| entry.score > 0.0);
    // `sort_by` is stable, so ties keep corpus order.
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(top_k);
    scored.into_iter().map(|entry| entry.item).collect()
}

fn lexical_scores(question: &str, corpus: &[ContextItem]) -> Vec<ScoredItem> {
    let lowered = question.to_lowercase();
    let tokens: Vec<&str> = lowered
        .split_whitespace()
        .filter(|token| token.chars().count() >= MIN_TOKEN_CHARS)
        .collect();

    corpus
        .iter()
        .map(|item| {
            let text = item.text.to_lowercase();
            let hits = tokens.iter().filter(|token| text.contains(*token)).count();
            ScoredItem {
                item: item.clone(),
                score: hits as f32,
            }
        })
        .collect()
}

fn embedding_scores(
    engine: &dyn EmbeddingEngine,
    model: &str,
    question: &str,
    corpus: &[ContextItem],
) -> Result<Vec<ScoredItem>, DomainError> {
    let mut texts: Vec<String> = corpus.iter().map(|item| item.text.clone()).collect();
    texts.push(question.to_string());

    let mut vectors = engine.embed(model, &texts)?;
    if vectors.len() != texts.len() {
        return Err(DomainError::embedding(format!(
            "expected {} embeddings, got {}",
            texts.len(),
            vectors.len()
        )));
    }

    let query = vectors.pop().unwrap_or_default();
    Ok(corpus
        .iter()
        .zip(vectors.iter())
        .map(|(item, vector)| ScoredItem {
            item: item.clone(),
            score: cosine_similarity(&query, vector),
        })
        .collect())
}

/// Cosine similarity in [-1, 1]. Mismatched lengths and zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut a_norm = 0.0f32;
    let mut b_norm = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        a_norm += x * x;
        b_norm += y * y;
    }

    let denom = a_norm.sqrt() * b_norm.sqrt();
    if denom == 0.0 {
        return 0.0;
    }

    (dot / denom).clamp(-1.0, 1.0)
}
