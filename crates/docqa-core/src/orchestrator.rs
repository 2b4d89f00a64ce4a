//! Wires the components into one question-answering entry point.
//!
//! ```text
//!                     ┌─────────────── tools disabled ───────────────┐
//!  ask(session, q) ───┤                                              ├──▶ commit ──▶ Reply
//!                     └─ tools enabled ─┬─ ConversationalRag::answer ┤
//!                                       └─ ToolAgent::run ───────────┘
//!                                                 (join, then Synthesizer)
//! ```
//!
//! History and the agent memory change only after an answer has been
//! produced; a failed `ask` records nothing.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use crate::agent::{
    AgentMemory, AgentSettings, AgentStep, DocumentQaTool, ToolAgent, ToolRegistry,
};
use crate::chunk::SplitterConfig;
use crate::conversation::ConversationalRag;
use crate::embedding::Embedder;
use crate::error::{QaError, Result};
use crate::history::HistoryStore;
use crate::index::{CorpusSignature, IndexManager, IndexSnapshot, RefreshOutcome};
use crate::llm::ChatModel;
use crate::loader::DocumentLoader;
use crate::models::{Chunk, UploadedFile};
use crate::rag::{RagAnswerer, RagSettings};
use crate::synth::Synthesizer;

#[derive(Debug, Clone)]
pub struct QaSettings {
    pub splitter: SplitterConfig,
    pub rag: RagSettings,
    pub agent: AgentSettings,
    /// Seed the agent with the session history and keep it updated.
    pub agent_memory: bool,
}

impl Default for QaSettings {
    fn default() -> Self {
        Self {
            splitter: SplitterConfig::default(),
            rag: RagSettings::default(),
            agent: AgentSettings::default(),
            agent_memory: true,
        }
    }
}

/// Everything a tool agent was built from. A different key means a
/// different agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentKey {
    pub credential_tag: String,
    pub session_id: String,
    pub index_signature: Option<CorpusSignature>,
}

#[derive(Debug, Clone)]
pub struct Reply {
    pub answer: String,
    /// Answer from the indexed documents, when an index was active.
    pub document_answer: Option<String>,
    /// Answer from the tool agent, when tools were enabled.
    pub agent_answer: Option<String>,
    pub source_chunks: Vec<Chunk>,
    pub agent_steps: Vec<AgentStep>,
}

pub struct Orchestrator {
    chat: Arc<dyn ChatModel>,
    credential_tag: String,
    embedder: Arc<dyn Embedder>,
    history: Arc<HistoryStore>,
    index: IndexManager,
    tools: Option<ToolRegistry>,
    agent: Mutex<Option<(AgentKey, Arc<ToolAgent>)>>,
    settings: QaSettings,
}

impl Orchestrator {
    /// Create an orchestrator with an empty history and no index. Tools are
    /// disabled until [`set_tools`](Self::set_tools) is called.
    ///
    /// `credential_tag` identifies the credentials behind `chat` without
    /// revealing them (e.g. the last characters of an API key).
    pub fn new(
        chat: Arc<dyn ChatModel>,
        credential_tag: impl Into<String>,
        embedder: Arc<dyn Embedder>,
        settings: QaSettings,
    ) -> Self {
        Self {
            chat,
            credential_tag: credential_tag.into(),
            embedder,
            history: Arc::new(HistoryStore::new()),
            index: IndexManager::new(),
            tools: None,
            agent: Mutex::new(None),
            settings,
        }
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    pub fn settings(&self) -> &QaSettings {
        &self.settings
    }

    pub fn active_index(&self) -> Option<Arc<IndexSnapshot>> {
        self.index.active()
    }

    pub fn tools_enabled(&self) -> bool {
        self.tools.is_some()
    }

    /// Enable the tool agent with `tools` (`Some`) or disable it (`None`).
    pub fn set_tools(&mut self, tools: Option<ToolRegistry>) {
        self.tools = tools;
        self.drop_agent();
    }

    /// Swap the chat model. A cached agent is dropped when the credential
    /// tag changes.
    pub fn set_chat_model(&mut self, chat: Arc<dyn ChatModel>, credential_tag: impl Into<String>) {
        let credential_tag = credential_tag.into();
        if credential_tag != self.credential_tag {
            self.drop_agent();
        }
        self.chat = chat;
        self.credential_tag = credential_tag;
    }

    /// Key of the currently cached agent, if any.
    pub fn cached_agent_key(&self) -> Option<AgentKey> {
        self.agent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|(key, _)| key.clone())
    }

    /// The currently cached agent, if any.
    pub fn cached_agent(&self) -> Option<Arc<ToolAgent>> {
        self.agent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|(_, agent)| Arc::clone(agent))
    }

    fn drop_agent(&self) {
        *self.agent.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Index `files`, reusing the active index when the file set is unchanged.
    pub async fn refresh_corpus(
        &self,
        files: &[UploadedFile],
        loader: &dyn DocumentLoader,
    ) -> Result<RefreshOutcome> {
        self.index
            .refresh(
                files,
                loader,
                &self.settings.splitter,
                self.embedder.as_ref(),
            )
            .await
    }

    fn answerer(&self) -> RagAnswerer {
        RagAnswerer::new(
            Arc::clone(&self.chat),
            Arc::clone(&self.embedder),
            self.settings.rag.clone(),
        )
    }

    fn conversation(&self) -> ConversationalRag {
        ConversationalRag::new(self.answerer(), Arc::clone(&self.history))
    }

    /// Return the cached agent for this session and index, building a new
    /// one when anything it depends on has changed.
    fn agent_for(
        &self,
        session_id: &str,
        index: Option<&Arc<IndexSnapshot>>,
        tools: &ToolRegistry,
    ) -> Result<Arc<ToolAgent>> {
        let key = AgentKey {
            credential_tag: self.credential_tag.clone(),
            session_id: session_id.to_string(),
            index_signature: index.map(|ix| ix.signature().clone()),
        };

        let mut cached = self.agent.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((cached_key, agent)) = cached.as_ref() {
            if cached_key == &key {
                return Ok(Arc::clone(agent));
            }
        }

        let mut registry = ToolRegistry::new();
        if let Some(ix) = index {
            registry.register(Arc::new(DocumentQaTool::new(
                self.answerer(),
                Arc::clone(&self.history),
                session_id,
                Arc::clone(ix),
            )));
        }
        for tool in tools.tools() {
            registry.register(Arc::clone(tool));
        }

        let memory = if self.settings.agent_memory {
            Some(AgentMemory::seeded(&self.history.get_or_create(session_id)?))
        } else {
            None
        };

        info!(
            session = session_id,
            tools = ?registry.names(),
            index = ?key.index_signature.as_ref().map(|s| s.short().to_string()),
            "building tool agent"
        );
        let agent = Arc::new(ToolAgent::new(
            Arc::clone(&self.chat),
            registry,
            memory,
            self.settings.agent,
        ));
        *cached = Some((key, Arc::clone(&agent)));
        Ok(agent)
    }

    /// Answer `question` within `session_id` and record the exchange.
    ///
    /// # Errors
    ///
    /// - [`QaError::InvalidSession`] for an empty session id.
    /// - [`QaError::NoIndex`] when tools are disabled and nothing usable is
    ///   indexed; no model is called.
    /// - Any error from the answering components. History is not modified.
    pub async fn ask(&self, session_id: &str, question: &str) -> Result<Reply> {
        if session_id.trim().is_empty() {
            return Err(QaError::InvalidSession(session_id.to_string()));
        }
        // A corpus whose files all failed to load indexes nothing.
        let index = self.index.active().filter(|ix| !ix.is_empty());

        let Some(tools) = &self.tools else {
            let index = index.ok_or(QaError::NoIndex)?;
            let rag = self.conversation().invoke(session_id, question, &index).await?;
            info!(session = session_id, "answered from documents");
            return Ok(Reply {
                answer: rag.answer.clone(),
                document_answer: Some(rag.answer),
                agent_answer: None,
                source_chunks: rag.source_chunks,
                agent_steps: Vec::new(),
            });
        };

        let agent = self.agent_for(session_id, index.as_ref(), tools)?;
        let conversation = self.conversation();
        let document = async {
            match &index {
                Some(ix) => conversation.answer(session_id, question, ix).await.map(Some),
                None => Ok(None),
            }
        };
        let (document, run) = futures::join!(document, agent.run(question));
        let document = document?;
        let run = run?;

        let document_answer = document.as_ref().map(|d| d.answer.clone());
        let answer = Synthesizer::new(Arc::clone(&self.chat))
            .combine(question, document_answer.as_deref(), Some(&run.answer))
            .await?;
        debug!(
            steps = run.steps.len(),
            with_documents = document.is_some(),
            "synthesized reply"
        );

        self.history.append_exchange(session_id, question, &answer)?;
        agent.record_exchange(question, &answer);
        info!(session = session_id, "answered with tools");

        Ok(Reply {
            answer,
            document_answer,
            agent_answer: Some(run.answer),
            source_chunks: document.map(|d| d.source_chunks).unwrap_or_default(),
            agent_steps: run.steps,
        })
    }
}
