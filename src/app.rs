//! Interactive session state behind the `docqa` binary.
//!
//! [`App`] owns the [`Orchestrator`] and the [`ResourceFactory`] that feeds
//! it, and applies the REPL commands parsed by [`parse_line`]: switching
//! session, loading documents, toggling web tools and changing the API key.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::Config;
use crate::extract::{collect_files, FileLoader};
use crate::resources::{credential_tag, ResourceFactory};
use docqa_core::chunk::split_documents;
use docqa_core::index::RefreshOutcome;
use docqa_core::loader::DocumentLoader;
use docqa_core::models::{Chunk, ChatTurn, Role};
use docqa_core::orchestrator::{Orchestrator, Reply};

pub const DEFAULT_SESSION: &str = "default_session";

/// `--api-key` if given, otherwise the environment variable named by the
/// `[llm]` section.
pub fn resolve_api_key(flag: Option<&str>, config: &Config) -> Result<String> {
    if let Some(key) = flag.map(str::trim).filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }
    config.llm.api_key_from_env().with_context(|| {
        format!(
            "No API key: pass --api-key or set {}",
            config.llm.resolved_api_key_env()
        )
    })
}

pub struct App {
    factory: ResourceFactory,
    orchestrator: Orchestrator,
    session_id: String,
}

impl App {
    pub fn new(config: Config, api_key: &str, session_id: impl Into<String>) -> Result<Self> {
        let settings = config.qa_settings()?;
        let tools_on = config.agent.enabled;
        let factory = ResourceFactory::new(config);

        let chat = factory.chat_model(api_key)?;
        let embedder = factory.embedder()?;
        let mut orchestrator =
            Orchestrator::new(chat, credential_tag(api_key), embedder, settings);
        if tools_on {
            orchestrator.set_tools(Some(factory.tools()?));
        }

        Ok(Self {
            factory,
            orchestrator,
            session_id: session_id.into(),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn set_session(&mut self, session_id: &str) -> Result<()> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            anyhow::bail!("session id must not be empty");
        }
        self.session_id = session_id.to_string();
        Ok(())
    }

    pub fn tools_enabled(&self) -> bool {
        self.orchestrator.tools_enabled()
    }

    pub fn set_tools(&mut self, enabled: bool) -> Result<()> {
        let tools = if enabled {
            Some(self.factory.tools()?)
        } else {
            None
        };
        self.orchestrator.set_tools(tools);
        Ok(())
    }

    pub fn set_api_key(&mut self, api_key: &str) -> Result<()> {
        let chat = self.factory.chat_model(api_key)?;
        self.orchestrator.set_chat_model(chat, credential_tag(api_key));
        Ok(())
    }

    /// Index the documents under `paths`, replacing the active corpus.
    pub async fn load(&self, paths: &[PathBuf]) -> Result<RefreshOutcome> {
        self.load_with(paths, &FileLoader).await
    }

    pub async fn load_with(
        &self,
        paths: &[PathBuf],
        loader: &dyn DocumentLoader,
    ) -> Result<RefreshOutcome> {
        let files = collect_files(paths)?;
        if files.is_empty() {
            anyhow::bail!("No PDF or text documents found");
        }
        let outcome = self.orchestrator.refresh_corpus(&files, loader).await?;
        for failure in &outcome.failures {
            warn!(file = %failure.name, reason = %failure.reason, "skipped document");
        }
        info!(
            files = files.len(),
            chunks = outcome.snapshot.len(),
            rebuilt = outcome.rebuilt,
            "corpus ready"
        );
        Ok(outcome)
    }

    pub async fn ask(&self, question: &str) -> Result<Reply> {
        Ok(self.orchestrator.ask(&self.session_id, question).await?)
    }

    pub fn history(&self) -> Result<Vec<ChatTurn>> {
        Ok(self.orchestrator.history().get_or_create(&self.session_id)?)
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }
}

/// One line of REPL input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ask(String),
    Session(String),
    Load(Vec<PathBuf>),
    History,
    Tools(bool),
    Key(String),
    Quit,
}

/// Parse a REPL line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix(':') else {
        return Ok(Some(Command::Ask(line.to_string())));
    };

    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();
    let command = match (name, args.as_slice()) {
        ("session", [id]) => Command::Session(id.to_string()),
        ("session", _) => return Err("usage: :session <id>".into()),
        ("load", []) => return Err("usage: :load <paths>...".into()),
        ("load", paths) => Command::Load(paths.iter().map(PathBuf::from).collect()),
        ("history", []) => Command::History,
        ("tools", ["on"]) => Command::Tools(true),
        ("tools", ["off"]) => Command::Tools(false),
        ("tools", _) => return Err("usage: :tools on|off".into()),
        ("key", [key]) => Command::Key(key.to_string()),
        ("key", _) => return Err("usage: :key <api-key>".into()),
        ("quit" | "q" | "exit", []) => Command::Quit,
        (other, _) => return Err(format!("unknown command ':{}'", other)),
    };
    Ok(Some(command))
}

/// Answer text followed by the labels of the chunks it was grounded on.
pub fn format_reply(reply: &Reply) -> String {
    let mut out = reply.answer.trim().to_string();
    if !reply.source_chunks.is_empty() {
        let labels: Vec<String> = reply.source_chunks.iter().map(Chunk::label).collect();
        out.push_str("\n\nSources: ");
        out.push_str(&labels.join(", "));
    }
    out
}

pub fn format_history(turns: &[ChatTurn]) -> String {
    turns
        .iter()
        .map(|turn| {
            let who = match turn.role {
                Role::Human => "you",
                Role::Assistant => "docqa",
            };
            format!("{}: {}", who, turn.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Chunks the configured splitter produces for `paths`, without embedding.
pub fn preview_chunks(config: &Config, paths: &[PathBuf]) -> Result<Vec<Chunk>> {
    let settings = config.qa_settings()?;
    let mut documents = Vec::new();
    for file in collect_files(paths)? {
        match FileLoader.load(&file.bytes, &file.name) {
            Ok(texts) => documents.extend(texts),
            Err(e) => warn!(file = %e.name, reason = %e.reason, "skipped document"),
        }
    }
    Ok(split_documents(&documents, &settings.splitter))
}
