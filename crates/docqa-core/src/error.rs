//! Error taxonomy for the question-answering core.
//!
//! Every fallible core operation returns [`QaError`]. Chat-model failures keep
//! their provider classification ([`ChatModelError`]) so callers can tell an
//! expired key from a rate limit. Document loading failures ([`LoadError`]) are
//! never fatal on their own: the index manager collects them per file and
//! keeps going.

use thiserror::Error;

/// Invalid configuration detected before any work starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid configuration: {0}")]
pub struct ConfigError(pub String);

/// A single document could not be read or decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to load '{name}': {reason}")]
pub struct LoadError {
    pub name: String,
    pub reason: String,
}

impl LoadError {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Failure reported by a [`ChatModel`](crate::llm::ChatModel) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatModelError {
    #[error("chat model rejected credentials: {0}")]
    Auth(String),
    #[error("chat model rate limited: {0}")]
    RateLimit(String),
    #[error("chat model unreachable: {0}")]
    Network(String),
    #[error("chat model error: {0}")]
    Provider(String),
}

#[derive(Debug, Error)]
pub enum QaError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("index build failed: {0}")]
    IndexBuild(String),

    #[error(transparent)]
    Chat(#[from] ChatModelError),

    #[error("invalid session id: {0:?}")]
    InvalidSession(String),

    /// No corpus has been indexed and no tool agent is available.
    #[error("no index available: load documents or enable tools first")]
    NoIndex,

    #[error("embedder '{query}' does not match index embedder '{index}'; rebuild the index")]
    EmbedderMismatch { index: String, query: String },

    #[error("query embedding failed: {0}")]
    Embedding(String),
}

pub type Result<T, E = QaError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_error_converts() {
        let err: QaError = ChatModelError::RateLimit("slow down".into()).into();
        assert!(matches!(err, QaError::Chat(ChatModelError::RateLimit(_))));
        assert_eq!(err.to_string(), "chat model rate limited: slow down");
    }

    #[test]
    fn test_load_error_display() {
        let err = LoadError::new("a.pdf", "truncated xref");
        assert_eq!(err.to_string(), "failed to load 'a.pdf': truncated xref");
    }
}
