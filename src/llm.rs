//! OpenAI-compatible chat completions client.
//!
//! Works with any provider that serves `POST {base_url}/chat/completions`
//! in the OpenAI format (Groq, OpenAI, local gateways). Unlike the embedding
//! backends this client never retries: each failure is classified and handed
//! back to the caller.
//!
//! | Outcome | Error |
//! |---------|-------|
//! | HTTP 401 / 403 | [`ChatModelError::Auth`] |
//! | HTTP 429 | [`ChatModelError::RateLimit`] |
//! | connect / timeout | [`ChatModelError::Network`] |
//! | anything else | [`ChatModelError::Provider`] |

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::LlmConfig;
use docqa_core::error::ChatModelError;
use docqa_core::llm::{ChatMessage, ChatModel};

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiChatModel {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiChatModel {
    pub fn new(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.resolved_base_url(),
            api_key: api_key.into(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

fn classify_status(status: reqwest::StatusCode, body: String) -> ChatModelError {
    let detail = format!("{}: {}", status, body);
    match status.as_u16() {
        401 | 403 => ChatModelError::Auth(detail),
        429 => ChatModelError::RateLimit(detail),
        _ => ChatModelError::Provider(detail),
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ChatModelError> {
        let request = CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        debug!(
            model = %self.model,
            messages = messages.len(),
            prompt_chars = messages.iter().map(|m| m.content.len()).sum::<usize>(),
            "chat completion"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChatModelError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ChatModelError::Provider(format!("invalid completion response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ChatModelError::Provider("completion response has no content".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        use reqwest::StatusCode;
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, String::new()),
            ChatModelError::Auth(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, String::new()),
            ChatModelError::Auth(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            ChatModelError::RateLimit(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, "upstream".into()),
            ChatModelError::Provider(d) if d.contains("upstream")
        ));
    }

    #[test]
    fn test_request_serialization() {
        let messages = vec![ChatMessage::system("rules"), ChatMessage::user("hi")];
        let body = serde_json::to_value(CompletionRequest {
            model: "gemma2-9b-it",
            messages: &messages,
            temperature: 0.0,
            max_tokens: 1024,
        })
        .unwrap();
        assert_eq!(body["model"], "gemma2-9b-it");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["max_tokens"], 1024);
    }
}
