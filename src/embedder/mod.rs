/// Embedder trait and shared types for text embedding.
///
/// Concrete embedders call a remote provider over blocking HTTP; see
/// [`crate::provider::Provider::embedder`] for how one is chosen.
pub mod mock;
pub mod ollama;
pub mod openai;

use thiserror::Error;

/// Errors that can occur during embedding operations.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("embedding request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("embedding provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
}

/// Trait for text embedding implementations.
///
/// All implementations must be `Send + Sync` to allow concurrent use
/// behind `Arc`.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        self.embed_batch(&[text])?
            .pop()
            .ok_or_else(|| EmbedderError::InvalidResponse("no embedding returned".into()))
    }

    /// Embed multiple text strings into vectors, in input order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError>;

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;
}

/// Read a JSON array of numbers as an embedding vector.
pub(crate) fn parse_vector(value: &serde_json::Value) -> Result<Vec<f32>, EmbedderError> {
    value
        .as_array()
        .ok_or_else(|| EmbedderError::InvalidResponse("embedding is not an array".into()))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| EmbedderError::InvalidResponse("embedding holds a non-number".into()))
        })
        .collect()
}

/// Fail with `Status` unless the response is a 2xx.
pub(crate) fn check_status(
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, EmbedderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(EmbedderError::Status {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_vector() {
        assert_eq!(parse_vector(&json!([0.5, -1, 2.25])).unwrap(), vec![0.5, -1.0, 2.25]);
        assert!(parse_vector(&json!({"a": 1})).is_err());
        assert!(parse_vector(&json!([1, "x"])).is_err());
    }
}
