//! Embeddings from a local Ollama instance via `POST /api/embed`.
use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::json;

use super::{Embedder, EmbedderError, check_status, parse_vector};

pub struct OllamaEmbedder {
    client: Client,
    url: String,
    model: String,
    dimensions: usize,
}

impl OllamaEmbedder {
    pub fn new(
        url: &str,
        model: &str,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self, EmbedderError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimensions,
        })
    }
}

impl Embedder for OllamaEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(format!("{}/api/embed", self.url))
            .json(&body)
            .send()?;
        let json: serde_json::Value = check_status(response)?.json()?;

        let vectors = parse_ollama_response(&json)?;
        if vectors.len() != texts.len() {
            return Err(EmbedderError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbedderError> {
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| EmbedderError::InvalidResponse("missing embeddings array".into()))?
        .iter()
        .map(parse_vector)
        .collect()
}
