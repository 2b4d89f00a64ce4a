//! Memoized construction of chat models, the embedder and the web tools.
//!
//! Building an HTTP client per question is wasteful and loading a local
//! embedding model is slow, so [`ResourceFactory`] builds each resource once
//! and hands out shared handles. Chat models are keyed by
//! `(credential, model)`; API keys are only ever held as SHA-256 digests in
//! the cache key.

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::llm::OpenAiChatModel;
use crate::tools::build_tools;
use docqa_core::agent::ToolRegistry;
use docqa_core::embedding::Embedder;
use docqa_core::llm::ChatModel;

/// Short, non-reversible identifier for an API key.
///
/// Used as the orchestrator's credential tag: two keys produce different
/// tags, and the tag reveals nothing about the key.
pub fn credential_tag(api_key: &str) -> String {
    let digest = Sha256::digest(api_key.as_bytes());
    digest[..6].iter().map(|b| format!("{:02x}", b)).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ChatKey {
    credential: String,
    model: String,
}

pub struct ResourceFactory {
    config: Config,
    chat_models: Mutex<HashMap<ChatKey, Arc<dyn ChatModel>>>,
    embedder: Mutex<Option<Arc<dyn Embedder>>>,
    tools: Mutex<Option<ToolRegistry>>,
}

impl ResourceFactory {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            chat_models: Mutex::new(HashMap::new()),
            embedder: Mutex::new(None),
            tools: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The chat model for `api_key`, built on first use.
    pub fn chat_model(&self, api_key: &str) -> Result<Arc<dyn ChatModel>> {
        let key = ChatKey {
            credential: credential_tag(api_key),
            model: self.config.llm.model.clone(),
        };
        let mut models = self
            .chat_models
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(model) = models.get(&key) {
            return Ok(Arc::clone(model));
        }

        debug!(model = %key.model, credential = %key.credential, "building chat model");
        let model: Arc<dyn ChatModel> = Arc::new(OpenAiChatModel::new(&self.config.llm, api_key)?);
        models.insert(key, Arc::clone(&model));
        Ok(model)
    }

    /// The configured embedder, built on first use.
    pub fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        let mut cached = self.embedder.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(embedder) = cached.as_ref() {
            return Ok(Arc::clone(embedder));
        }
        let embedder = create_embedder(&self.config.embedding)?;
        debug!(model = embedder.model_name(), "built embedder");
        *cached = Some(Arc::clone(&embedder));
        Ok(embedder)
    }

    /// The enabled web tools, built on first use.
    pub fn tools(&self) -> Result<ToolRegistry> {
        let mut cached = self.tools.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tools) = cached.as_ref() {
            return Ok(tools.clone());
        }
        let tools = build_tools(&self.config.tools)?;
        *cached = Some(tools.clone());
        Ok(tools)
    }

    /// Forget every cached resource.
    pub fn invalidate(&self) {
        self.chat_models
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        *self.embedder.lock().unwrap_or_else(PoisonError::into_inner) = None;
        *self.tools.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> ResourceFactory {
        let mut config = Config::default();
        config.embedding.provider = "hashing".into();
        ResourceFactory::new(config)
    }

    #[test]
    fn test_credential_tag_is_stable_and_opaque() {
        let tag = credential_tag("gsk_secret_1234");
        assert_eq!(tag, credential_tag("gsk_secret_1234"));
        assert_ne!(tag, credential_tag("gsk_secret_5678"));
        assert_eq!(tag.len(), 12);
        assert!(!tag.contains("1234"));
    }

    #[test]
    fn test_chat_models_memoized_per_key() {
        let factory = factory();
        let a = factory.chat_model("key-a").unwrap();
        let again = factory.chat_model("key-a").unwrap();
        let b = factory.chat_model("key-b").unwrap();
        assert!(Arc::ptr_eq(&a, &again));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.model_name(), "gemma2-9b-it");
    }

    #[test]
    fn test_embedder_cached_until_invalidated() {
        let factory = factory();
        let first = factory.embedder().unwrap();
        assert!(Arc::ptr_eq(&first, &factory.embedder().unwrap()));
        assert_eq!(first.model_name(), "hashing-bow");

        let chat = factory.chat_model("key").unwrap();
        factory.invalidate();
        assert!(!Arc::ptr_eq(&first, &factory.embedder().unwrap()));
        assert!(!Arc::ptr_eq(&chat, &factory.chat_model("key").unwrap()));
    }

    #[test]
    fn test_tools_follow_config() {
        let mut config = Config::default();
        config.tools.wikipedia = false;
        let factory = ResourceFactory::new(config);
        assert_eq!(factory.tools().unwrap().names(), vec!["arxiv", "Search"]);
    }
}
