//! Retrieval-augmented answering over the active index.
//!
//! # Pipeline
//!
//! ```text
//! question ──▶ QueryRewriter ──▶ embed ──▶ IndexSnapshot::search(k)
//!                                                 │
//!            chat model ◀── system(instruction + context) + history + question
//! ```
//!
//! The system instruction tells the model to answer only from the retrieved
//! context and to reply with the configured "I don't know" sentinel when the
//! context is insufficient. That is a prompt contract, not something the code
//! can verify.

use std::sync::Arc;

use tracing::debug;

use crate::embedding::Embedder;
use crate::error::{QaError, Result};
use crate::index::IndexSnapshot;
use crate::llm::{history_messages, ChatMessage, ChatModel};
use crate::models::{ChatTurn, Chunk};
use crate::rewrite::QueryRewriter;

pub const DEFAULT_RETRIEVAL_K: usize = 4;
pub const DEFAULT_IDK_SENTINEL: &str = "I don't know";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RagSettings {
    /// Number of chunks retrieved per question.
    pub retrieval_k: usize,
    /// Exact reply used when the context does not contain the answer.
    pub idk_sentinel: String,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            retrieval_k: DEFAULT_RETRIEVAL_K,
            idk_sentinel: DEFAULT_IDK_SENTINEL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RagAnswer {
    pub answer: String,
    /// The question actually used for retrieval.
    pub standalone_question: String,
    /// Retrieved chunks, most similar first.
    pub source_chunks: Vec<Chunk>,
}

pub fn qa_instruction(idk_sentinel: &str, context: &str) -> String {
    format!(
        "You are a helpful assistant that answers questions based on the provided context. \
         If the question is not answerable with the context, respond with '{}'. \
         Answer concisely and accurately.\n\n{}",
        idk_sentinel, context
    )
}

#[derive(Clone)]
pub struct RagAnswerer {
    chat: Arc<dyn ChatModel>,
    embedder: Arc<dyn Embedder>,
    rewriter: QueryRewriter,
    settings: RagSettings,
}

impl RagAnswerer {
    pub fn new(chat: Arc<dyn ChatModel>, embedder: Arc<dyn Embedder>, settings: RagSettings) -> Self {
        Self {
            rewriter: QueryRewriter::new(Arc::clone(&chat)),
            chat,
            embedder,
            settings,
        }
    }

    pub fn settings(&self) -> &RagSettings {
        &self.settings
    }

    /// Answer `question` from `index`, using `history` for rewriting and as
    /// conversational context.
    ///
    /// # Errors
    ///
    /// - [`QaError::Chat`] if either model call fails.
    /// - [`QaError::EmbedderMismatch`] if `index` was built by another embedder.
    /// - [`QaError::Embedding`] if the question cannot be embedded.
    pub async fn answer(
        &self,
        question: &str,
        history: &[ChatTurn],
        index: &IndexSnapshot,
    ) -> Result<RagAnswer> {
        if index.embedder_model() != self.embedder.model_name() {
            return Err(QaError::EmbedderMismatch {
                index: index.embedder_model().to_string(),
                query: self.embedder.model_name().to_string(),
            });
        }

        let standalone = self.rewriter.rewrite(history, question).await?;
        let query_vec = self
            .embedder
            .embed(&standalone)
            .await
            .map_err(|e| QaError::Embedding(format!("{:#}", e)))?;

        let hits = index.search(&query_vec, self.settings.retrieval_k);
        debug!(
            question = %standalone,
            retrieved = hits.len(),
            top_score = hits.first().map(|h| h.score),
            "retrieved context"
        );
        let source_chunks: Vec<Chunk> = hits.into_iter().map(|h| h.chunk).collect();

        if source_chunks.is_empty() {
            return Ok(RagAnswer {
                answer: self.settings.idk_sentinel.clone(),
                standalone_question: standalone,
                source_chunks,
            });
        }

        let context = source_chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(qa_instruction(
            &self.settings.idk_sentinel,
            &context,
        )));
        messages.extend(history_messages(history));
        messages.push(ChatMessage::user(question));

        let reply = self.chat.complete(&messages).await?;
        Ok(RagAnswer {
            answer: self.normalize(&reply),
            standalone_question: standalone,
            source_chunks,
        })
    }

    /// Trim the reply and collapse sentinel variants ("I don't know.",
    /// "'I don't know'") to the exact sentinel.
    fn normalize(&self, reply: &str) -> String {
        let trimmed = reply.trim();
        let bare = trimmed
            .trim_matches(|c: char| c == '\'' || c == '"' || c == '.' || c.is_whitespace());
        if bare.eq_ignore_ascii_case(&self.settings.idk_sentinel) {
            self.settings.idk_sentinel.clone()
        } else {
            trimmed.to_string()
        }
    }
}
