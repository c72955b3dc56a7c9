//! OpenAI-compatible chat completions client
//!
//! Uses a long-lived reqwest::Client for connection pooling.
//! `api_base` is configurable so proxies and self-hosted gateways work.

use crate::config::LlmConfig;
use crate::error::OrchestrationError;
use crate::llm::LanguageModel;
use crate::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

const SYSTEM_PROMPT: &str = r#"You are a precise financial analysis assistant.

Guidelines:
- Answer only from the information you are given, or say it is unavailable
- Be structured and concise
- Never reveal masked personal data
- Use professional financial language"#;

/// Reusable chat-completions client (connection-pooled)
pub struct OpenAiClient {
    client: Client,
    config: LlmConfig,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| OrchestrationError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'))
    }

    fn build_request(&self, prompt: &str) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        if !self.config.is_configured() {
            return Err(OrchestrationError::LlmError(
                "OPENAI_API_KEY not configured".to_string(),
            ));
        }

        let request = self.build_request(prompt);

        info!(model = %self.config.model, "Calling chat completions API");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Chat completions request failed: {}", e);
                OrchestrationError::LlmError(format!("request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "Chat completions error response: {}", error_text);
            let reason = if status == StatusCode::TOO_MANY_REQUESTS {
                "quota or rate limit exceeded"
            } else {
                "request rejected"
            };
            return Err(OrchestrationError::LlmError(format!(
                "{} ({}): {}",
                reason, status, error_text
            )));
        }

        let body: ChatResponse = response.json().await.map_err(|e| {
            error!("Failed to parse chat completions response: {}", e);
            OrchestrationError::LlmError(format!("parse error: {}", e))
        })?;

        extract_answer(body)
    }
}

fn extract_answer(body: ChatResponse) -> Result<String> {
    let choice = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| OrchestrationError::LlmError("no choices in response".to_string()))?;

    let content = choice.message.content.unwrap_or_default();
    if content.trim().is_empty() {
        return Err(OrchestrationError::LlmError(format!(
            "empty completion (finish_reason: {})",
            choice.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }

    Ok(content)
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
