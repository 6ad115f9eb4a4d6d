use std::str::FromStr;

use fastembed::{EmbeddingModel, TextEmbedding, TextInitOptions};
use parking_lot::Mutex;

use crate::{application::services::EmbeddingEngine, domain::DomainError};

/// Local ONNX embedding engine backed by `fastembed`.
///
/// The loaded model sits behind a `Mutex` so one instance serves every
/// scoring call.
pub struct FastEmbedEngine {
    model_label: String,
    dimensions: usize,
    inner: Mutex<TextEmbedding>,
}

impl FastEmbedEngine {
    /// Loads the given model, for example `BAAI/bge-small-en-v1.5`.
    pub fn try_new(model_name: impl AsRef<str>) -> Result<Self, DomainError> {
        let label = model_name.as_ref().trim();
        if label.is_empty() {
            return Err(DomainError::validation("fastembed model name cannot be empty"));
        }

        let embedding_model = EmbeddingModel::from_str(label).map_err(|err| {
            DomainError::embedding(format!("unknown fastembed model `{label}`: {err}"))
        })?;
        let model_info = TextEmbedding::get_model_info(&embedding_model).map_err(|err| {
            DomainError::embedding(format!("no metadata for fastembed model `{label}`: {err}"))
        })?;
        let text_embedding = TextEmbedding::try_new(TextInitOptions::new(embedding_model.clone()))
            .map_err(|err| {
                DomainError::embedding(format!("failed to load fastembed model `{label}`: {err}"))
            })?;

        Ok(Self {
            model_label: label.to_string(),
            dimensions: model_info.dim,
            inner: Mutex::new(text_embedding),
        })
    }
}

impl EmbeddingEngine for FastEmbedEngine {
    fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        if !model.eq_ignore_ascii_case(&self.model_label) {
            return Err(DomainError::embedding(format!(
                "engine initialised for `{}` but `{}` requested",
                self.model_label, model
            )));
        }
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self
            .inner
            .lock()
            .embed(texts.to_vec(), None)
            .map_err(|err| DomainError::embedding(format!("fastembed inference failed: {err}")))?;

        if vectors.len() != texts.len() {
            return Err(DomainError::embedding(format!(
                "fastembed returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }

    fn dims(&self, _model: &str) -> Option<usize> {
        Some(self.dimensions)
    }
}
