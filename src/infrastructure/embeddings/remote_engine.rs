use std::time::Duration;

use serde_json::{json, Value};

use crate::{
    application::services::EmbeddingEngine,
    domain::DomainError,
    infrastructure::http_client::{build_agent, describe_http_error, join_url},
};

/// Embedding engine for OpenAI-compatible `/embeddings` endpoints.
pub struct RemoteEmbeddingEngine {
    url: String,
    api_key: Option<String>,
    agent: ureq::Agent,
}

impl RemoteEmbeddingEngine {
    pub fn new(api_base: &str, path: &str, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            url: join_url(api_base, path),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            agent: build_agent(timeout),
        }
    }
}

impl EmbeddingEngine for RemoteEmbeddingEngine {
    fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self.agent.post(&self.url);
        if let Some(key) = &self.api_key {
            request = request.set("Authorization", &format!("Bearer {key}"));
        }

        let response = request
            .send_json(json!({ "model": model, "input": texts }))
            .map_err(|err| DomainError::embedding(describe_http_error(err)))?;
        let body: Value = response.into_json().map_err(|err| {
            DomainError::embedding(format!("failed to read embedding response: {err}"))
        })?;

        let vectors = parse_embedding_response(&body)?;
        if vectors.len() != texts.len() {
            return Err(DomainError::embedding(format!(
                "embedding endpoint returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }
}

/// Vectors from a `{"data": [{"index", "embedding"}]}` body, ordered by
/// `index` (position when absent).
fn parse_embedding_response(body: &Value) -> Result<Vec<Vec<f32>>, DomainError> {
    let data = body
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| DomainError::embedding("embedding response is missing the data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(Value::as_u64)
            .map_or(position, |index| index as usize);
        let values = item
            .get("embedding")
            .and_then(Value::as_array)
            .ok_or_else(|| DomainError::embedding("embedding item is missing its vector"))?;
        let vector = values
            .iter()
            .map(|value| {
                value
                    .as_f64()
                    .map(|number| number as f32)
                    .ok_or_else(|| DomainError::embedding("embedding values must be numeric"))
            })
            .collect::<Result<Vec<f32>, _>>()?;
        indexed.push((index, vector));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, vector)| vector).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vectors_follow_index_order() {
        let body = json!({
            "data": [
                { "index": 1, "embedding": [2.0, 3.0] },
                { "index": 0, "embedding": [0.5, 1.5] }
            ]
        });
        assert_eq!(
            parse_embedding_response(&body).unwrap(),
            vec![vec![0.5, 1.5], vec![2.0, 3.0]]
        );
    }

    #[test]
    fn malformed_bodies_are_embedding_errors() {
        assert!(parse_embedding_response(&json!({ "object": "list" })).is_err());
        assert!(parse_embedding_response(&json!({ "data": [{ "index": 0 }] })).is_err());
        assert!(
            parse_embedding_response(&json!({ "data": [{ "embedding": ["x"] }] })).is_err()
        );
    }

    #[test]
    fn empty_batch_skips_the_request() {
        let engine = RemoteEmbeddingEngine::new(
            "http://127.0.0.1:9",
            "/embeddings",
            None,
            Duration::from_millis(10),
        );
        assert!(engine.embed("m", &[]).unwrap().is_empty());
    }
}
