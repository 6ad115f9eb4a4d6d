use serde::{Deserialize, Serialize};

/// One natural-language question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,
}

/// Result envelope returned to callers of the query engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub success: bool,
    pub answer: String,
    /// Context lines handed to the generator, each tagged with its source.
    pub context: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResponse {
    pub fn answered(answer: impl Into<String>, context: Vec<String>) -> Self {
        Self {
            success: true,
            answer: answer.into(),
            context,
            error: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            answer: String::new(),
            context: Vec::new(),
            error: Some(reason.into()),
        }
    }
}

/// Health/readiness report for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatusResponse {
    pub ok: bool,
    pub message: String,
    pub details: Option<String>,
}
