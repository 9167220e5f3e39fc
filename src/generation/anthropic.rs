//! Anthropic messages API client
use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::json;

use super::{ChatPrompt, GenerationError, Generator, check_status};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

pub struct AnthropicGenerator {
    client: Client,
    api_key: String,
    model: String,
    temperature: f32,
}

impl AnthropicGenerator {
    pub fn new(
        api_key: &str,
        model: &str,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
            temperature,
        })
    }
}

impl Generator for AnthropicGenerator {
    fn generate(&self, prompt: &ChatPrompt) -> Result<String, GenerationError> {
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "temperature": self.temperature,
            "system": prompt.system,
            "messages": [{ "role": "user", "content": prompt.user }],
        });

        let response = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()?;
        let json: serde_json::Value = check_status(response)?.json()?;
        parse_reply(&json)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Concatenate the `text` blocks of a messages API reply.
fn parse_reply(json: &serde_json::Value) -> Result<String, GenerationError> {
    let blocks = json
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| GenerationError::InvalidResponse("missing content".into()))?;

    let text: String = blocks
        .iter()
        .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
        .collect();

    Ok(text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reply_joins_text_blocks() {
        let reply = json!({
            "content": [
                {"type": "text", "text": "Hello "},
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": "world"}
            ]
        });
        assert_eq!(parse_reply(&reply).unwrap(), "Hello world");
        assert!(parse_reply(&json!({"type": "error"})).is_err());
    }
}
