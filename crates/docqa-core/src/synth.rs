//! Merges the document answer and the agent answer into one reply.

use std::sync::Arc;

use crate::error::Result;
use crate::llm::{ChatMessage, ChatModel};

/// Placeholder rendered for a missing or empty answer.
pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Clone)]
pub struct Synthesizer {
    chat: Arc<dyn ChatModel>,
}

fn present(answer: Option<&str>) -> Option<&str> {
    answer.map(str::trim).filter(|a| !a.is_empty())
}

impl Synthesizer {
    pub fn new(chat: Arc<dyn ChatModel>) -> Self {
        Self { chat }
    }

    pub fn build_prompt(question: &str, document_answer: Option<&str>, web_answer: Option<&str>) -> String {
        format!(
            "You are a helpful assistant. Combine the following answers into one clear, concise \
             response to the user's question. Prefer precise facts from the PDF answer when \
             available, and augment with web information only if it adds non-conflicting useful \
             context. Do not mention sources or that you combined answers.\n\n\
             Question: {}\n\
             PDF answer: {}\n\
             Web answer: {}\n\n\
             Final combined answer:",
            question,
            present(document_answer).unwrap_or(NOT_AVAILABLE),
            present(web_answer).unwrap_or(NOT_AVAILABLE),
        )
    }

    /// Produce the final reply with one model call. A missing answer is
    /// rendered as [`NOT_AVAILABLE`] in the prompt.
    pub async fn combine(
        &self,
        question: &str,
        document_answer: Option<&str>,
        web_answer: Option<&str>,
    ) -> Result<String> {
        let prompt = Self::build_prompt(question, document_answer, web_answer);
        let reply = self.chat.complete(&[ChatMessage::user(prompt)]).await?;
        Ok(reply.trim().to_string())
    }
}
