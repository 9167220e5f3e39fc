//! Ollama chat client (`POST /api/chat`, non-streaming)
use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::json;

use super::{ChatPrompt, GenerationError, Generator, check_status, text_at};

pub struct OllamaGenerator {
    client: Client,
    url: String,
    model: String,
    temperature: f32,
}

impl OllamaGenerator {
    pub fn new(
        url: &str,
        model: &str,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature,
        })
    }

    fn request_body(&self, prompt: &ChatPrompt) -> serde_json::Value {
        json!({
            "model": self.model,
            "stream": false,
            "options": { "temperature": self.temperature },
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.user },
            ],
        })
    }
}

impl Generator for OllamaGenerator {
    fn generate(&self, prompt: &ChatPrompt) -> Result<String, GenerationError> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.url))
            .json(&self.request_body(prompt))
            .send()?;
        let json: serde_json::Value = check_status(response)?.json()?;
        Ok(text_at(&json, "/message/content")?.trim().to_string())
    }

    fn model(&self) -> &str {
        &self.model
    }
}
