//! Answer generation through a chat-completion provider.
//!
//! Generators are blocking and `Send + Sync` so the query service can hold
//! one behind an `Arc` next to the embedder.
pub mod anthropic;
pub mod ollama;
pub mod openai;
pub mod prompt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("generation provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid generation response: {0}")]
    InvalidResponse(String),
}

/// A system + user message pair sent to a chat model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPrompt {
    pub system: String,
    pub user: String,
}

pub trait Generator: Send + Sync {
    /// Run one non-streaming chat completion and return the reply text.
    fn generate(&self, prompt: &ChatPrompt) -> Result<String, GenerationError>;

    /// Model identifier, for logging.
    fn model(&self) -> &str;
}

pub(crate) fn check_status(
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, GenerationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(GenerationError::Status {
        status: status.as_u16(),
        body,
    })
}

pub(crate) fn text_at<'a>(
    json: &'a serde_json::Value,
    pointer: &str,
) -> Result<&'a str, GenerationError> {
    json.pointer(pointer)
        .and_then(|v| v.as_str())
        .ok_or_else(|| GenerationError::InvalidResponse(format!("missing {pointer}")))
}
