//! TOML configuration.
//!
//! Every section and field is optional; a missing file means all defaults,
//! which gives the Groq-hosted `gemma2-9b-it` chat model, local
//! `all-minilm-l6-v2` embeddings and 5000/500 character chunks.
//!
//! ```toml
//! [chunking]
//! chunk_size = 5000
//! chunk_overlap = 500
//!
//! [retrieval]
//! k = 4
//!
//! [llm]
//! provider = "groq"          # or "openai"
//! model = "gemma2-9b-it"
//!
//! [embedding]
//! provider = "local"         # local | openai | ollama | hashing
//!
//! [agent]
//! enabled = true
//!
//! [tools]
//! max_chars = 250
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use docqa_core::agent::AgentSettings;
use docqa_core::chunk::SplitterConfig;
use docqa_core::orchestrator::QaSettings;
use docqa_core::rag::RagSettings;

/// Config file looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "docqa.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    docqa_core::chunk::DEFAULT_CHUNK_SIZE
}
fn default_chunk_overlap() -> usize {
    docqa_core::chunk::DEFAULT_CHUNK_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_idk_sentinel")]
    pub idk_sentinel: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            idk_sentinel: default_idk_sentinel(),
        }
    }
}

fn default_k() -> usize {
    docqa_core::rag::DEFAULT_RETRIEVAL_K
}
fn default_idk_sentinel() -> String {
    docqa_core::rag::DEFAULT_IDK_SENTINEL.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Overrides the provider's default endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    /// Environment variable holding the API key. Defaults per provider.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            base_url: None,
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout_secs(),
            api_key_env: None,
        }
    }
}

fn default_llm_provider() -> String {
    "groq".to_string()
}
fn default_llm_model() -> String {
    "gemma2-9b-it".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_llm_timeout_secs() -> u64 {
    60
}

impl LlmConfig {
    pub fn resolved_base_url(&self) -> String {
        if let Some(url) = &self.base_url {
            return url.trim_end_matches('/').to_string();
        }
        match self.provider.as_str() {
            "openai" => "https://api.openai.com/v1".to_string(),
            _ => "https://api.groq.com/openai/v1".to_string(),
        }
    }

    pub fn resolved_api_key_env(&self) -> String {
        if let Some(var) = &self.api_key_env {
            return var.clone();
        }
        match self.provider.as_str() {
            "openai" => "OPENAI_API_KEY".to_string(),
            _ => "GROQ_API_KEY".to_string(),
        }
    }

    /// API key from the configured environment variable, if set and non-empty.
    pub fn api_key_from_env(&self) -> Option<String> {
        std::env::var(self.resolved_api_key_env())
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for `ollama` (default `http://localhost:11434`) or `openai`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_max_parse_retries")]
    pub max_parse_retries: usize,
    #[serde(default = "default_true")]
    pub memory: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_iterations: default_max_iterations(),
            max_parse_retries: default_max_parse_retries(),
            memory: true,
        }
    }
}

fn default_max_iterations() -> usize {
    docqa_core::agent::DEFAULT_MAX_ITERATIONS
}
fn default_max_parse_retries() -> usize {
    docqa_core::agent::DEFAULT_MAX_PARSE_RETRIES
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ToolsConfig {
    #[serde(default = "default_true")]
    pub wikipedia: bool,
    #[serde(default = "default_true")]
    pub arxiv: bool,
    #[serde(default = "default_true")]
    pub web_search: bool,
    /// Tool output is truncated to this many characters.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_tools_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_wikipedia_url")]
    pub wikipedia_url: String,
    #[serde(default = "default_arxiv_url")]
    pub arxiv_url: String,
    #[serde(default = "default_search_url")]
    pub search_url: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            wikipedia: true,
            arxiv: true,
            web_search: true,
            max_chars: default_max_chars(),
            timeout_secs: default_tools_timeout_secs(),
            wikipedia_url: default_wikipedia_url(),
            arxiv_url: default_arxiv_url(),
            search_url: default_search_url(),
        }
    }
}

fn default_max_chars() -> usize {
    250
}
fn default_tools_timeout_secs() -> u64 {
    15
}
fn default_wikipedia_url() -> String {
    "https://en.wikipedia.org/w/api.php".to_string()
}
fn default_arxiv_url() -> String {
    "http://export.arxiv.org/api/query".to_string()
}
fn default_search_url() -> String {
    "https://api.duckduckgo.com/".to_string()
}

impl Config {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            anyhow::bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            anyhow::bail!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }

        if self.retrieval.k == 0 {
            anyhow::bail!("retrieval.k must be >= 1");
        }
        if self.retrieval.idk_sentinel.trim().is_empty() {
            anyhow::bail!("retrieval.idk_sentinel must not be empty");
        }

        match self.llm.provider.as_str() {
            "groq" | "openai" => {}
            other => anyhow::bail!(
                "Unknown llm provider: '{}'. Must be groq or openai.",
                other
            ),
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
        }
        if self.llm.max_tokens == 0 {
            anyhow::bail!("llm.max_tokens must be > 0");
        }

        match self.embedding.provider.as_str() {
            "local" | "hashing" => {}
            "openai" | "ollama" => {
                if self.embedding.model.is_none() {
                    anyhow::bail!(
                        "embedding.model must be specified when provider is '{}'",
                        self.embedding.provider
                    );
                }
                if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                    anyhow::bail!(
                        "embedding.dims must be > 0 when provider is '{}'",
                        self.embedding.provider
                    );
                }
            }
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be local, openai, ollama, or hashing.",
                other
            ),
        }
        if self.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }

        if self.agent.max_iterations == 0 {
            anyhow::bail!("agent.max_iterations must be >= 1");
        }

        Ok(())
    }

    /// Core settings derived from this config.
    pub fn qa_settings(&self) -> Result<QaSettings> {
        let splitter =
            SplitterConfig::new(self.chunking.chunk_size, self.chunking.chunk_overlap)?;
        Ok(QaSettings {
            splitter,
            rag: RagSettings {
                retrieval_k: self.retrieval.k,
                idk_sentinel: self.retrieval.idk_sentinel.clone(),
            },
            agent: AgentSettings {
                max_iterations: self.agent.max_iterations,
                max_parse_retries: self.agent.max_parse_retries,
            },
            agent_memory: self.agent.memory,
        })
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Load `path` if given (it must exist), otherwise `docqa.toml` in the
/// working directory if present, otherwise defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load_config(path),
        None => {
            let fallback = Path::new(DEFAULT_CONFIG_FILE);
            if fallback.exists() {
                load_config(fallback)
            } else {
                Ok(Config::default())
            }
        }
    }
}
