//! Tool-using ReAct agent.
//!
//! The agent answers a question by alternating model calls and tool calls
//! until the model commits to a final answer:
//!
//! ```text
//!            ┌──────────── observation ◀────────────┐
//!            ▼                                      │
//!  Thinking ──▶ chat model ──▶ parse_step ──▶ ToolCall ──▶ Tool::call
//!                                  │
//!                                  └──▶ FinalAnswer ──▶ done
//! ```
//!
//! Failure handling:
//!
//! - unknown tools and failing tools produce an observation; the loop goes on;
//! - unparseable model output produces a corrective observation, at most
//!   `max_parse_retries` times;
//! - when either the retries or the `max_iterations` model calls run out the
//!   loop stops with [`ITERATION_LIMIT_ANSWER`];
//! - chat-model errors propagate.

use std::sync::{Arc, PoisonError, RwLock};

use anyhow::bail;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;
use crate::history::HistoryStore;
use crate::index::IndexSnapshot;
use crate::llm::{history_messages, ChatMessage, ChatModel};
use crate::models::ChatTurn;
use crate::rag::RagAnswerer;

pub const DEFAULT_MAX_ITERATIONS: usize = 6;
pub const DEFAULT_MAX_PARSE_RETRIES: usize = 3;

/// Answer returned when the iteration or parse-retry budget runs out.
pub const ITERATION_LIMIT_ANSWER: &str = "Agent stopped due to iteration limit or time limit.";

const INVALID_FORMAT_OBSERVATION: &str = "Invalid Format: reply with either \
'Action:' followed by 'Action Input:', or with 'Final Answer:'.";

/// A capability the agent can invoke with a single text query.
///
/// Tools are best effort: an `Err` is shown to the model as an observation
/// and never aborts the run.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Identifier the model uses in `Action:` lines (e.g. `"wikipedia"`).
    fn name(&self) -> &str;

    /// One-line description shown to the model to decide when to use the tool.
    fn description(&self) -> &str;

    async fn call(&self, query: &str) -> anyhow::Result<String>;
}

/// Ordered set of tools offered to the agent.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool at the end of the list.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    /// Find a tool by name. Exact match first, then case-insensitive.
    pub fn find(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        let name = name.trim();
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .or_else(|| self.tools.iter().find(|t| t.name().eq_ignore_ascii_case(name)))
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

/// Conversation turns the agent sees as context, kept in step with the
/// session history after it is seeded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentMemory {
    turns: Vec<ChatTurn>,
}

impl AgentMemory {
    /// Copy a session's turns, skipping empty messages.
    pub fn seeded(turns: &[ChatTurn]) -> Self {
        Self {
            turns: turns
                .iter()
                .filter(|t| !t.content.trim().is_empty())
                .cloned()
                .collect(),
        }
    }

    pub fn record_exchange(&mut self, question: &str, answer: &str) {
        self.turns.push(ChatTurn::human(question));
        self.turns.push(ChatTurn::assistant(answer));
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentState {
    Thinking,
    ToolCall { tool: String, input: String },
    FinalAnswer(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentSettings {
    pub max_iterations: usize,
    pub max_parse_retries: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_parse_retries: DEFAULT_MAX_PARSE_RETRIES,
        }
    }
}

/// One executed tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentStep {
    pub tool: String,
    pub input: String,
    pub observation: String,
}

#[derive(Debug, Clone)]
pub struct AgentRun {
    pub answer: String,
    pub steps: Vec<AgentStep>,
}

// ═══════════════════════════════════════════════════════════════════════
// Output parsing
// ═══════════════════════════════════════════════════════════════════════

/// Interpret one model reply as a tool call or a final answer.
///
/// Accepts the ReAct text format (`Action:` / `Action Input:` or
/// `Final Answer:`) and JSON objects such as
/// `{"type":"tool_call","tool_name":"wikipedia","tool_args":"Rust"}`,
/// `{"type":"final","content":"..."}` or
/// `{"action":"Final Answer","action_input":"..."}`.
///
/// Returns `Err` with a short reason when the reply is neither.
pub fn parse_step(text: &str) -> std::result::Result<AgentState, String> {
    if let Some(state) = parse_json_from_text(text).and_then(|v| parse_step_from_value(&v)) {
        return Ok(state);
    }
    parse_react(text)
}

fn parse_react(text: &str) -> std::result::Result<AgentState, String> {
    let action = find_label(text, "Action:");
    let final_answer = find_label(text, "Final Answer:");

    match (action, final_answer) {
        (Some(_), Some(_)) => Err("reply contains both an action and a final answer".to_string()),
        (None, Some(start)) => {
            let answer = text[start..].trim();
            if answer.is_empty() {
                return Err("final answer is empty".to_string());
            }
            Ok(AgentState::FinalAnswer(answer.to_string()))
        }
        (Some(start), None) => {
            let rest = &text[start..];
            let input_at = rest
                .find("Action Input:")
                .ok_or_else(|| "missing 'Action Input:' after 'Action:'".to_string())?;
            let tool = rest[..input_at].trim();
            if tool.is_empty() {
                return Err("action names no tool".to_string());
            }
            let mut input = &rest[input_at + "Action Input:".len()..];
            // Models sometimes hallucinate the observation themselves.
            if let Some(cut) = input.find("\nObservation") {
                input = &input[..cut];
            }
            let input = input.trim().trim_matches('"').trim();
            Ok(AgentState::ToolCall {
                tool: tool.to_string(),
                input: input.to_string(),
            })
        }
        (None, None) => Err("reply has neither 'Action:' nor 'Final Answer:'".to_string()),
    }
}

/// Byte offset just after `label`, if present.
fn find_label(text: &str, label: &str) -> Option<usize> {
    text.find(label).map(|i| i + label.len())
}

fn parse_json_from_text(text: &str) -> Option<Value> {
    let trimmed = text.trim();

    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Some(v);
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&trimmed[start..=end]).ok()
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("query")
            .or_else(|| map.get("input"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}

fn final_answer(content: &str) -> Option<AgentState> {
    let content = content.trim();
    (!content.is_empty()).then(|| AgentState::FinalAnswer(content.to_string()))
}

fn parse_step_from_value(value: &Value) -> Option<AgentState> {
    let kind = value
        .get("type")
        .or_else(|| value.get("action"))
        .and_then(Value::as_str)?;

    match kind {
        "final" => {
            let content = value
                .get("content")
                .or_else(|| value.get("message"))
                .and_then(Value::as_str)?;
            final_answer(content)
        }
        "Final Answer" => final_answer(&value.get("action_input").map(value_text)?),
        "tool_call" => {
            let tool = value
                .get("tool_name")
                .or_else(|| value.get("tool"))
                .and_then(Value::as_str)?;
            let input = value
                .get("tool_args")
                .or_else(|| value.get("args"))
                .map(value_text)
                .unwrap_or_default();
            Some(AgentState::ToolCall {
                tool: tool.to_string(),
                input,
            })
        }
        tool if value.get("action_input").is_some() => Some(AgentState::ToolCall {
            tool: tool.to_string(),
            input: value.get("action_input").map(value_text).unwrap_or_default(),
        }),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Agent
// ═══════════════════════════════════════════════════════════════════════

fn build_instructions(tools: &ToolRegistry) -> String {
    let descriptions = if tools.is_empty() {
        "(no tools available; answer from your own knowledge)".to_string()
    } else {
        tools
            .tools()
            .iter()
            .map(|t| format!("{}: {}", t.name(), t.description()))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "Answer the following questions as best you can. You have access to the following tools:\n\n\
         {descriptions}\n\n\
         Use the following format:\n\n\
         Question: the input question you must answer\n\
         Thought: you should always think about what to do\n\
         Action: the action to take, should be one of [{names}]\n\
         Action Input: the input to the action\n\
         Observation: the result of the action\n\
         ... (this Thought/Action/Action Input/Observation can repeat N times)\n\
         Thought: I now know the final answer\n\
         Final Answer: the final answer to the original input question\n\n\
         Begin!",
        names = tools.names().join(", ")
    )
}

pub struct ToolAgent {
    chat: Arc<dyn ChatModel>,
    tools: ToolRegistry,
    memory: RwLock<Option<AgentMemory>>,
    settings: AgentSettings,
}

impl ToolAgent {
    pub fn new(
        chat: Arc<dyn ChatModel>,
        tools: ToolRegistry,
        memory: Option<AgentMemory>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            chat,
            tools,
            memory: RwLock::new(memory),
            settings,
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Memory turns, or `None` when the agent runs without memory.
    pub fn memory(&self) -> Option<AgentMemory> {
        self.memory
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Mirror a committed exchange into the agent's memory, if it has one.
    pub fn record_exchange(&self, question: &str, answer: &str) {
        if let Some(memory) = self
            .memory
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            memory.record_exchange(question, answer);
        }
    }

    fn prompt(&self, question: &str, scratchpad: &str) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(build_instructions(&self.tools))];
        if let Some(memory) = self.memory.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            messages.extend(history_messages(memory.turns()));
        }
        messages.push(ChatMessage::user(format!(
            "Question: {}\nThought:{}",
            question, scratchpad
        )));
        messages
    }

    async fn invoke_tool(&self, name: &str, input: &str) -> String {
        let Some(tool) = self.tools.find(name) else {
            warn!(tool = name, "agent requested unknown tool");
            return format!(
                "{} is not a valid tool, try one of [{}].",
                name,
                self.tools.names().join(", ")
            );
        };

        match tool.call(input).await {
            Ok(output) => output,
            Err(e) => {
                warn!(tool = name, error = %format!("{:#}", e), "tool call failed");
                format!("Tool `{}` failed: {:#}", tool.name(), e)
            }
        }
    }

    /// Run the loop for one question.
    pub async fn run(&self, question: &str) -> Result<AgentRun> {
        let mut scratchpad = String::new();
        let mut steps = Vec::new();
        let mut iterations = 0;
        let mut parse_failures = 0;
        let mut state = AgentState::Thinking;

        loop {
            state = match state {
                AgentState::Thinking => {
                    if iterations >= self.settings.max_iterations {
                        warn!(iterations, "agent hit iteration limit");
                        return Ok(AgentRun {
                            answer: ITERATION_LIMIT_ANSWER.to_string(),
                            steps,
                        });
                    }
                    iterations += 1;

                    let reply = self.chat.complete(&self.prompt(question, &scratchpad)).await?;
                    match parse_step(&reply) {
                        Ok(AgentState::Thinking) => AgentState::Thinking,
                        Ok(AgentState::ToolCall { tool, input }) => {
                            scratchpad.push(' ');
                            scratchpad.push_str(reply.trim());
                            AgentState::ToolCall { tool, input }
                        }
                        Ok(done @ AgentState::FinalAnswer(_)) => done,
                        Err(reason) => {
                            parse_failures += 1;
                            if parse_failures > self.settings.max_parse_retries {
                                warn!(%reason, output = %reply, "agent parse retries exhausted");
                                return Ok(AgentRun {
                                    answer: ITERATION_LIMIT_ANSWER.to_string(),
                                    steps,
                                });
                            }
                            warn!(attempt = parse_failures, %reason, "unparseable agent output");
                            scratchpad.push(' ');
                            scratchpad.push_str(reply.trim());
                            scratchpad.push_str("\nObservation: ");
                            scratchpad.push_str(INVALID_FORMAT_OBSERVATION);
                            scratchpad.push_str("\nThought:");
                            AgentState::Thinking
                        }
                    }
                }
                AgentState::ToolCall { tool, input } => {
                    debug!(tool = %tool, input = %input, "agent tool call");
                    let observation = self.invoke_tool(&tool, &input).await;
                    scratchpad.push_str("\nObservation: ");
                    scratchpad.push_str(&observation);
                    scratchpad.push_str("\nThought:");
                    steps.push(AgentStep {
                        tool,
                        input,
                        observation,
                    });
                    AgentState::Thinking
                }
                AgentState::FinalAnswer(answer) => {
                    debug!(steps = steps.len(), iterations, "agent finished");
                    return Ok(AgentRun { answer, steps });
                }
            };
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Document QA tool
// ═══════════════════════════════════════════════════════════════════════

pub const DOCUMENT_QA_TOOL_NAME: &str = "pdf_qa";

/// Exposes retrieval QA over one index snapshot as an agent tool.
///
/// Each call reads the session's history at call time, so the tool sees
/// the same conversation the direct document answer does.
pub struct DocumentQaTool {
    answerer: RagAnswerer,
    history: Arc<HistoryStore>,
    session_id: String,
    index: Arc<IndexSnapshot>,
}

impl DocumentQaTool {
    pub fn new(
        answerer: RagAnswerer,
        history: Arc<HistoryStore>,
        session_id: impl Into<String>,
        index: Arc<IndexSnapshot>,
    ) -> Self {
        Self {
            answerer,
            history,
            session_id: session_id.into(),
            index,
        }
    }
}

#[async_trait]
impl Tool for DocumentQaTool {
    fn name(&self) -> &str {
        DOCUMENT_QA_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Answer questions using the uploaded PDFs with conversation memory. \
         Prefer this for questions about the uploaded documents."
    }

    async fn call(&self, query: &str) -> anyhow::Result<String> {
        if query.trim().is_empty() {
            bail!("empty query");
        }
        let turns = self.history.get_or_create(&self.session_id)?;
        let answer = self.answerer.answer(query, &turns, &self.index).await?;
        Ok(answer.answer)
    }
}
