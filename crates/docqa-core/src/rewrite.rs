//! History-aware question rewriting.
//!
//! Follow-up questions such as "and what about its colour?" only make sense
//! with the conversation in view. [`QueryRewriter`] asks the chat model to
//! turn the latest question into one that stands on its own, so retrieval
//! can embed it without the history.

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::llm::{history_messages, ChatMessage, ChatModel};
use crate::models::ChatTurn;

pub const CONTEXTUALIZE_INSTRUCTION: &str = "Given a chat history and latest user question \
which might reference context in the chat history, formulate a standalone question that can be \
understood without the chat history. Do not answer the question, just return the formulated \
question if it is needed and otherwise return it as is.";

#[derive(Clone)]
pub struct QueryRewriter {
    chat: Arc<dyn ChatModel>,
}

impl QueryRewriter {
    pub fn new(chat: Arc<dyn ChatModel>) -> Self {
        Self { chat }
    }

    /// Messages sent to the model: instruction, history, question.
    pub fn build_messages(history: &[ChatTurn], question: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(CONTEXTUALIZE_INSTRUCTION));
        messages.extend(history_messages(history));
        messages.push(ChatMessage::user(question));
        messages
    }

    /// Produce a standalone version of `question`.
    ///
    /// With an empty history there is nothing to resolve against and the
    /// question is returned unchanged without a model call. Chat-model errors
    /// are returned as-is.
    pub async fn rewrite(&self, history: &[ChatTurn], question: &str) -> Result<String> {
        if history.is_empty() {
            return Ok(question.to_string());
        }

        let reply = self
            .chat
            .complete(&Self::build_messages(history, question))
            .await?;
        let rewritten = reply.trim();
        if rewritten.is_empty() {
            return Ok(question.to_string());
        }

        debug!(original = question, rewritten, "rewrote question");
        Ok(rewritten.to_string())
    }
}
