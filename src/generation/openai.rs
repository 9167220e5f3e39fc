//! OpenAI chat completions client
use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::json;

use super::{ChatPrompt, GenerationError, Generator, check_status, text_at};

pub struct OpenAiGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiGenerator {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            temperature,
        })
    }
}

impl Generator for OpenAiGenerator {
    fn generate(&self, prompt: &ChatPrompt) -> Result<String, GenerationError> {
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.user },
            ],
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?;
        let json: serde_json::Value = check_status(response)?.json()?;
        Ok(text_at(&json, "/choices/0/message/content")?.trim().to_string())
    }

    fn model(&self) -> &str {
        &self.model
    }
}
