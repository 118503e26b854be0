//! OpenAI-compatible chat completions backend.

use super::json::extract_json_object;
use super::AiBackend;
use crate::config::OpenAiSettings;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

pub struct OpenAiBackend {
    client: Client,
    settings: OpenAiSettings,
}

impl OpenAiBackend {
    pub fn new(settings: OpenAiSettings, timeout: Duration) -> Result<Self> {
        if settings.api_key.trim().is_empty() {
            bail!("missing OpenAI API key");
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, settings })
    }

    async fn complete(&self, system: &str, prompt: &str, json_mode: bool) -> Result<String> {
        let url = format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        );
        let body = ChatCompletionRequest {
            model: &self.settings.model,
            temperature: self.settings.temperature,
            response_format: json_mode.then_some(ResponseFormat {
                r#type: "json_object",
            }),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await
            .context("openai request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<response unavailable>".to_string());
            bail!("openai returned {status}: {text}");
        }

        let response: ChatCompletionResponse =
            response.json().await.context("openai response invalid")?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("openai response missing content"))
    }
}

#[async_trait]
impl AiBackend for OpenAiBackend {
    async fn complete_json(&self, system: &str, prompt: &str) -> Result<Value> {
        let content = self.complete(system, prompt, true).await?;
        let json = extract_json_object(&content)
            .ok_or_else(|| anyhow!("openai response missing JSON object"))?;
        serde_json::from_str(&json).context("failed to parse model JSON")
    }

    async fn chat(&self, system: &str, prompt: &str) -> Result<String> {
        self.complete(system, prompt, false).await
    }

    fn name(&self) -> &str {
        &self.settings.model
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}
