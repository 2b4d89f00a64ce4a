//! Retrieval QA bound to session history.

use std::sync::Arc;

use crate::error::Result;
use crate::history::HistoryStore;
use crate::index::IndexSnapshot;
use crate::rag::{RagAnswer, RagAnswerer};

/// Wraps a [`RagAnswerer`] so that each call reads the session's history
/// from a shared [`HistoryStore`].
#[derive(Clone)]
pub struct ConversationalRag {
    answerer: RagAnswerer,
    history: Arc<HistoryStore>,
}

impl ConversationalRag {
    pub fn new(answerer: RagAnswerer, history: Arc<HistoryStore>) -> Self {
        Self { answerer, history }
    }

    pub fn answerer(&self) -> &RagAnswerer {
        &self.answerer
    }

    /// Answer with the session's current history without recording anything.
    pub async fn answer(
        &self,
        session_id: &str,
        question: &str,
        index: &IndexSnapshot,
    ) -> Result<RagAnswer> {
        let turns = self.history.get_or_create(session_id)?;
        self.answerer.answer(question, &turns, index).await
    }

    /// Answer and, on success, append the question and answer to the
    /// session's history. A failed call leaves the history untouched.
    pub async fn invoke(
        &self,
        session_id: &str,
        question: &str,
        index: &IndexSnapshot,
    ) -> Result<RagAnswer> {
        let answer = self.answer(session_id, question, index).await?;
        self.history
            .append_exchange(session_id, question, &answer.answer)?;
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::error::{ChatModelError, QaError};
    use crate::index::CorpusSignature;
    use crate::models::{Chunk, Role};
    use crate::rag::RagSettings;
    use crate::test_support::ScriptedChat;

    async fn index() -> IndexSnapshot {
        let chunk = Chunk {
            source_id: "doc.txt".into(),
            position: 0,
            text: "The sky is blue.".into(),
        };
        IndexSnapshot::build(
            CorpusSignature::compute(&[], "hashing-bow"),
            vec![chunk],
            &HashingEmbedder::default(),
        )
        .await
        .unwrap()
    }

    fn rag(chat: Arc<ScriptedChat>, history: Arc<HistoryStore>) -> ConversationalRag {
        ConversationalRag::new(
            RagAnswerer::new(chat, Arc::new(HashingEmbedder::default()), RagSettings::default()),
            history,
        )
    }

    #[tokio::test]
    async fn test_invoke_records_exchange() {
        let history = Arc::new(HistoryStore::new());
        let conv = rag(Arc::new(ScriptedChat::replying("Blue.")), history.clone());
        conv.invoke("s1", "What color is the sky?", &index().await)
            .await
            .unwrap();

        let turns = history.get_or_create("s1").unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::Human);
        assert_eq!(turns[0].content, "What color is the sky?");
        assert_eq!(turns[1].content, "Blue.");
    }

    #[tokio::test]
    async fn test_answer_does_not_record() {
        let history = Arc::new(HistoryStore::new());
        let conv = rag(Arc::new(ScriptedChat::replying("Blue.")), history.clone());
        conv.answer("s1", "q", &index().await).await.unwrap();
        assert_eq!(history.len("s1"), 0);
    }

    #[tokio::test]
    async fn test_failure_leaves_history_unchanged() {
        let history = Arc::new(HistoryStore::new());
        history.append_exchange("s1", "earlier", "reply").unwrap();
        let chat = Arc::new(ScriptedChat::failing(ChatModelError::Network("down".into())));
        let conv = rag(chat, history.clone());

        let err = conv.invoke("s1", "q", &index().await).await.unwrap_err();
        assert!(matches!(err, QaError::Chat(ChatModelError::Network(_))));
        assert_eq!(history.len("s1"), 2);
    }
}
