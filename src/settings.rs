use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::application::services::{GenerationPolicy, ScorerKind, ServiceConfig};

/// Default filename used to persist configuration within the data directory.
const CONFIG_FILENAME: &str = "config.json";

/// Embedding backends the scorer can use.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "backend", rename_all = "kebab-case")]
pub enum EmbeddingBackend {
    /// Deterministic hash embedder, always available offline.
    Simple {
        #[serde(default = "default_simple_model")]
        model: String,
        #[serde(default = "default_simple_dim")]
        dimensions: usize,
    },
    /// OpenAI-compatible `/embeddings` endpoint.
    Remote {
        api_base: String,
        #[serde(default = "default_remote_path")]
        path: String,
        model: String,
        #[serde(default = "default_remote_timeout_ms")]
        timeout_ms: u64,
    },
    /// Local ONNX embeddings through fastembed (feature gated).
    #[cfg(feature = "fastembed-engine")]
    FastEmbed { model: String },
}

impl EmbeddingBackend {
    pub fn id(&self) -> &'static str {
        match self {
            EmbeddingBackend::Simple { .. } => "simple",
            EmbeddingBackend::Remote { .. } => "remote",
            #[cfg(feature = "fastembed-engine")]
            EmbeddingBackend::FastEmbed { .. } => "fastembed",
        }
    }

    pub fn model_name(&self) -> &str {
        match self {
            EmbeddingBackend::Simple { model, .. } => model,
            EmbeddingBackend::Remote { model, .. } => model,
            #[cfg(feature = "fastembed-engine")]
            EmbeddingBackend::FastEmbed { model } => model,
        }
    }
}

impl Default for EmbeddingBackend {
    fn default() -> Self {
        EmbeddingBackend::Simple {
            model: default_simple_model(),
            dimensions: default_simple_dim(),
        }
    }
}

/// Limits and switches for the three retrieval stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub structured_limit: usize,
    pub corpus_limit_per_kind: usize,
    pub top_k: usize,
    pub sample_size: usize,
    pub corpus_scoring: bool,
    pub scorer: ScorerKind,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        let service = ServiceConfig::default();
        Self {
            structured_limit: service.structured_limit,
            corpus_limit_per_kind: service.corpus_limit_per_kind,
            top_k: service.top_k,
            sample_size: service.sample_size,
            corpus_scoring: service.corpus_scoring,
            scorer: service.scorer,
        }
    }
}

/// Model endpoint, chain and retry budget for answer generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub api_base: String,
    pub primary_model: String,
    pub fallback_models: Vec<String>,
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_jitter_ms: u64,
    pub timeout_secs: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        let policy = GenerationPolicy::default();
        Self {
            api_base: crate::infrastructure::DEFAULT_GEMINI_API_BASE.to_string(),
            primary_model: policy.primary_model,
            fallback_models: policy.fallback_models,
            max_attempts: policy.max_attempts,
            base_backoff_ms: policy.base_backoff.as_millis() as u64,
            max_jitter_ms: policy.max_jitter.as_millis() as u64,
            timeout_secs: 60,
        }
    }
}

impl GenerationSettings {
    pub fn policy(&self) -> GenerationPolicy {
        GenerationPolicy {
            primary_model: self.primary_model.clone(),
            fallback_models: self.fallback_models.clone(),
            max_attempts: self.max_attempts.max(1),
            base_backoff: Duration::from_millis(self.base_backoff_ms),
            max_jitter: Duration::from_millis(self.max_jitter_ms),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Complete persisted configuration payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub embedding: EmbeddingBackend,
    #[serde(default)]
    pub retrieval: RetrievalSettings,
    #[serde(default)]
    pub generation: GenerationSettings,
}

impl AppConfig {
    pub fn service_config(&self) -> ServiceConfig {
        let retrieval = &self.retrieval;
        ServiceConfig {
            structured_limit: retrieval.structured_limit,
            corpus_limit_per_kind: retrieval.corpus_limit_per_kind,
            top_k: retrieval.top_k,
            sample_size: retrieval.sample_size,
            corpus_scoring: retrieval.corpus_scoring,
            scorer: retrieval.scorer,
            ..ServiceConfig::with_model(self.embedding.model_name())
        }
    }
}

/// Thread-safe manager responsible for loading and persisting `AppConfig`.
pub struct ConfigManager {
    path: PathBuf,
    state: RwLock<AppConfig>,
}

impl ConfigManager {
    /// Create a manager rooted at `data_dir`. The JSON file lives at
    /// `<data_dir>/config.json`; a missing or unreadable file means defaults.
    pub fn load(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = data_dir.as_ref().join(CONFIG_FILENAME);
        let config = if path.exists() {
            fs::read(&path)
                .ok()
                .and_then(|bytes| serde_json::from_slice::<AppConfig>(&bytes).ok())
                .unwrap_or_default()
        } else {
            AppConfig::default()
        };

        Ok(Self {
            path,
            state: RwLock::new(config),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the current configuration.
    pub fn current(&self) -> AppConfig {
        self.state.read().clone()
    }

    /// Replace the configuration and persist it.
    pub fn save(&self, config: AppConfig) -> std::io::Result<AppConfig> {
        let mut guard = self.state.write();
        Self::write_file(&self.path, &config)?;
        *guard = config;
        Ok(guard.clone())
    }

    /// Write the current configuration to disk, e.g. to seed a default file.
    pub fn persist(&self) -> std::io::Result<()> {
        let guard = self.state.read();
        Self::write_file(&self.path, &guard)
    }

    fn write_file(path: &Path, config: &AppConfig) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_vec_pretty(config)?;
        fs::write(path, payload)
    }
}

const fn default_simple_dim() -> usize {
    256
}

fn default_simple_model() -> String {
    crate::infrastructure::SIMPLE_MODEL.to_string()
}

fn default_remote_path() -> String {
    "/embeddings".to_string()
}

const fn default_remote_timeout_ms() -> u64 {
    10_000
}
