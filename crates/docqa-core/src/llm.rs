//! Chat model trait and message types.
//!
//! The core only needs a text-in/text-out completion call. The HTTP client
//! for OpenAI-compatible providers (Groq, OpenAI) lives in the `docqa`
//! application crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChatModelError;
use crate::models::{ChatTurn, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

impl From<&ChatTurn> for ChatMessage {
    fn from(turn: &ChatTurn) -> Self {
        match turn.role {
            Role::Human => Self::user(turn.content.clone()),
            Role::Assistant => Self::assistant(turn.content.clone()),
        }
    }
}

/// Convert stored turns into chat messages, preserving order.
pub fn history_messages(turns: &[ChatTurn]) -> Vec<ChatMessage> {
    turns.iter().map(ChatMessage::from).collect()
}

/// A chat completion backend.
///
/// Implementations own their transport concerns (timeouts, retries). The core
/// never retries a failed call: the error is returned to whoever asked.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Returns the model identifier (e.g. `"gemma2-9b-it"`).
    fn model_name(&self) -> &str;

    /// Complete a conversation, returning the assistant's reply text.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ChatModelError>;
}
