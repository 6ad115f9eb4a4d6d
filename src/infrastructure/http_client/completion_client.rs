use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{build_agent, describe_http_error, join_url};
use crate::{application::services::CompletionEngine, domain::DomainError};

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Completion engine calling the Gemini `generateContent` REST endpoint.
pub struct GeminiCompletionClient {
    api_base: String,
    api_key: String,
    agent: ureq::Agent,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GeminiCompletionClient {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api_base: api_base.into(),
            api_key: api_key.into(),
            agent: build_agent(timeout),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        join_url(
            &self.api_base,
            &format!("models/{}:generateContent", urlencoding::encode(model)),
        )
    }
}

/// Concatenated text parts of the first candidate; empty when the model
/// returned nothing usable.
fn first_candidate_text(response: GenerateResponse) -> String {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

impl CompletionEngine for GeminiCompletionClient {
    fn complete(&self, model: &str, prompt: &str) -> Result<String, DomainError> {
        if self.api_key.trim().is_empty() {
            return Err(DomainError::generation("missing Gemini API key"));
        }

        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        });

        debug!(target: "finrag::generation", model, "calling generateContent");
        let response = self
            .agent
            .post(&self.endpoint(model))
            .set("x-goog-api-key", &self.api_key)
            .send_json(body)
            .map_err(|err| DomainError::generation(describe_http_error(err)))?;

        let parsed: GenerateResponse = response.into_json().map_err(|err| {
            DomainError::generation(format!("failed to parse generateContent response: {err}"))
        })?;

        Ok(first_candidate_text(parsed))
    }
}
