//! Chat-completion client used for the model-generated part of the advice report.
//!
//! Works with any server implementing the OpenAI `/v1/chat/completions` API
//! (OpenAI itself, llama-server, vLLM, LocalAI, ...). One blocking request per
//! call, no retry, bounded by the configured timeout.

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::CompletionConfig;

/// Anything that turns a prompt into generated text.
pub(crate) trait CompletionService {
    fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

#[derive(Debug, Error)]
pub(crate) enum CompletionError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Completion API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed completion response: {0}")]
    Malformed(String),

    #[error("Completion response was empty")]
    Empty,
}

pub(crate) struct OpenAiClient {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
}

impl OpenAiClient {
    pub(crate) fn new(config: &CompletionConfig) -> Result<Self, CompletionError> {
        let http_client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn request_for(&self, prompt: &str) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: Some(self.temperature),
        }
    }
}

impl CompletionService for OpenAiClient {
    fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let mut req_builder = self
            .http_client
            .post(self.endpoint())
            .json(&self.request_for(prompt));

        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.bearer_auth(api_key);
        }

        debug!(url = %self.endpoint(), model = %self.model, "Requesting completion");
        let response = req_builder.send()?;
        let status = response.status();
        let body = response.text()?;

        if !status.is_success() {
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_completion(&body)
    }
}

/// Pull the first choice's text out of a chat-completion response body.
pub(crate) fn parse_completion(body: &str) -> Result<String, CompletionError> {
    let response: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| CompletionError::Malformed(e.to_string()))?;

    let content = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| CompletionError::Malformed("no choices in response".into()))?
        .message
        .content
        .unwrap_or_default();

    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(CompletionError::Empty);
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests;
