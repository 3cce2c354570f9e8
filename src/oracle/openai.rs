use super::{ChatClient, LlmError, Message, Role};
use crate::config::Config;
use anyhow::{Context, Result};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Blocking client for an OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct OpenAiClient {
    client: reqwest::blocking::Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiClient {
    pub fn new(cfg: &Config, api_key: String) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(cfg.llm.request_timeout_seconds.max(1)))
            .build()
            .with_context(|| "building HTTP client")?;
        Ok(Self {
            client,
            api_key,
            model: cfg.llm.model.clone(),
            base_url: cfg.llm.base_url.trim_end_matches('/').to_string(),
            temperature: cfg.llm.temperature,
            max_tokens: cfg.llm.max_tokens,
        })
    }
}

impl ChatClient for OpenAiClient {
    fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let api_messages: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| {
                json!({
                    "role": match m.role {
                        Role::System => "system",
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    "content": m.content,
                })
            })
            .collect();

        let body = json!({
            "model": self.model,
            "messages": api_messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "response_format": {"type": "json_object"},
        });

        debug!("OpenAI request to {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Api { status, body });
        }

        let resp: serde_json::Value = response.json()?;
        let content = resp["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmError::Parse("missing choices[0].message.content".into()))?
            .to_string();

        Ok(content)
    }
}
