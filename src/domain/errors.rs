use thiserror::Error;

/// Domain-level errors shared across application components.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The incoming question or payload violated an invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Catch-all for storage-related failures we don't want to leak directly.
    #[error("storage failure: {0}")]
    Storage(String),

    /// Embedding backend failed or returned unusable vectors.
    #[error("embedding failure: {0}")]
    Embedding(String),

    /// Generative model call failed. The message keeps the upstream status
    /// text so overload conditions stay detectable.
    #[error("generation failure: {0}")]
    Generation(String),

    /// Any other unexpected failure.
    #[error("unexpected error: {0}")]
    Other(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Whether the failure looks like a temporary overload of the upstream
    /// model service (HTTP 503, "unavailable", "overloaded").
    pub fn is_transient(&self) -> bool {
        let message = self.to_string().to_lowercase();
        message.contains("503") || message.contains("unavailable") || message.contains("overload")
    }
}
