//! Session-scoped chat history.
//!
//! [`HistoryStore`] maps a session id (exact string match) to an ordered,
//! append-only list of [`ChatTurn`]s. Histories are created on first access
//! and live as long as the store; there is no eviction. The store is an
//! ordinary object: create one per process (or service instance) and share it
//! with an `Arc`.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};

use tracing::debug;

use crate::error::{QaError, Result};
use crate::models::{ChatTurn, Role};

#[derive(Debug, Default)]
pub struct HistoryStore {
    sessions: RwLock<HashMap<String, Vec<ChatTurn>>>,
}

fn validate(session_id: &str) -> Result<()> {
    if session_id.trim().is_empty() {
        return Err(QaError::InvalidSession(session_id.to_string()));
    }
    Ok(())
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Vec<ChatTurn>>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return a copy of the session's turns, creating an empty history the
    /// first time an id is seen.
    pub fn get_or_create(&self, session_id: &str) -> Result<Vec<ChatTurn>> {
        validate(session_id)?;
        Ok(self
            .write()
            .entry(session_id.to_string())
            .or_default()
            .clone())
    }

    /// Append one turn to the end of the session's history.
    pub fn append(&self, session_id: &str, role: Role, content: impl Into<String>) -> Result<()> {
        validate(session_id)?;
        self.write()
            .entry(session_id.to_string())
            .or_default()
            .push(ChatTurn {
                role,
                content: content.into(),
            });
        Ok(())
    }

    /// Append a human question and the assistant's answer as one commit.
    ///
    /// Both turns land under a single lock acquisition, so no reader ever sees
    /// the question without its answer.
    pub fn append_exchange(&self, session_id: &str, question: &str, answer: &str) -> Result<()> {
        validate(session_id)?;
        let mut sessions = self.write();
        let turns = sessions.entry(session_id.to_string()).or_default();
        turns.push(ChatTurn::human(question));
        turns.push(ChatTurn::assistant(answer));
        debug!(session = session_id, turns = turns.len(), "committed exchange");
        Ok(())
    }

    /// Number of turns recorded for a session (0 if never seen).
    pub fn len(&self, session_id: &str) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .map_or(0, Vec::len)
    }

    /// All known session ids, sorted.
    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_is_idempotent() {
        let store = HistoryStore::new();
        assert!(store.get_or_create("s1").unwrap().is_empty());
        store.append("s1", Role::Human, "hi").unwrap();
        assert_eq!(store.get_or_create("s1").unwrap().len(), 1);
        assert_eq!(store.session_ids(), vec!["s1"]);
    }

    #[test]
    fn test_append_preserves_order() {
        let store = HistoryStore::new();
        store.append("s1", Role::Human, "q1").unwrap();
        store.append("s1", Role::Assistant, "a1").unwrap();
        store.append_exchange("s1", "q2", "a2").unwrap();
        let contents: Vec<String> = store
            .get_or_create("s1")
            .unwrap()
            .into_iter()
            .map(|t| t.content)
            .collect();
        assert_eq!(contents, vec!["q1", "a1", "q2", "a2"]);
    }

    #[test]
    fn test_sessions_are_independent() {
        let store = HistoryStore::new();
        store.append_exchange("s1", "q", "a").unwrap();
        assert_eq!(store.len("s1"), 2);
        assert_eq!(store.len("s2"), 0);
        assert!(store.get_or_create("s2").unwrap().is_empty());
    }

    #[test]
    fn test_ids_match_exactly() {
        let store = HistoryStore::new();
        store.append_exchange("S1", "q", "a").unwrap();
        assert_eq!(store.len("s1"), 0);
        assert_eq!(store.len("S1 "), 0);
    }

    #[test]
    fn test_empty_session_rejected() {
        let store = HistoryStore::new();
        assert!(matches!(
            store.append("", Role::Human, "q"),
            Err(QaError::InvalidSession(_))
        ));
        assert!(matches!(
            store.append_exchange("   ", "q", "a"),
            Err(QaError::InvalidSession(_))
        ));
        assert!(store.get_or_create("").is_err());
        assert!(store.session_ids().is_empty());
    }
}
