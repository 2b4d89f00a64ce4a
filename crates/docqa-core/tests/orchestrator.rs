//! End-to-end behaviour of the orchestrator with in-memory collaborators.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use docqa_core::agent::{Tool, ToolRegistry, ITERATION_LIMIT_ANSWER};
use docqa_core::embedding::HashingEmbedder;
use docqa_core::error::{ChatModelError, QaError};
use docqa_core::llm::{ChatMessage, ChatModel, MessageRole};
use docqa_core::loader::Utf8Loader;
use docqa_core::models::{Role, UploadedFile};
use docqa_core::orchestrator::{Orchestrator, QaSettings};

type Rule = dyn Fn(&[ChatMessage]) -> Result<String, ChatModelError> + Send + Sync;

/// Chat model that answers by inspecting the prompt.
struct RuleChat {
    rule: Box<Rule>,
    calls: AtomicUsize,
}

impl RuleChat {
    fn new(
        rule: impl Fn(&[ChatMessage]) -> Result<String, ChatModelError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            rule: Box::new(rule),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for RuleChat {
    fn model_name(&self) -> &str {
        "rule"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ChatModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.rule)(messages)
    }
}

fn system(messages: &[ChatMessage]) -> &str {
    messages
        .iter()
        .find(|m| m.role == MessageRole::System)
        .map(|m| m.content.as_str())
        .unwrap_or("")
}

fn last_user(messages: &[ChatMessage]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| m.role == MessageRole::User)
        .map(|m| m.content.as_str())
        .unwrap_or("")
}

/// Answers from context, runs a one-step agent and merges.
fn grounded(messages: &[ChatMessage]) -> Result<String, ChatModelError> {
    let sys = system(messages);
    if sys.starts_with("Given a chat history") {
        return Ok(last_user(messages).to_string());
    }
    if sys.starts_with("You are a helpful assistant that answers") {
        let answer = if sys.contains("The sky is blue") && last_user(messages).contains("sky") {
            "Blue."
        } else {
            "I don't know"
        };
        return Ok(answer.to_string());
    }
    if sys.starts_with("Answer the following questions") {
        return Ok("Thought: I know this\nFinal Answer: Rayleigh scattering makes it blue.".into());
    }
    let user = last_user(messages);
    if user.contains("Final combined answer:") {
        if user.contains("PDF answer: N/A") {
            return Ok("Rayleigh scattering.".into());
        }
        return Ok("Blue, because of Rayleigh scattering.".into());
    }
    Err(ChatModelError::Provider("unexpected prompt".into()))
}

fn grounded_chat() -> Arc<RuleChat> {
    RuleChat::new(grounded)
}

/// Like [`grounded`], but fails any call whose prompt contains `marker`
/// while `fail` is set.
fn failing_on(marker: &'static str, fail: Arc<AtomicBool>) -> Arc<RuleChat> {
    RuleChat::new(move |messages| {
        if fail.load(Ordering::SeqCst) && messages.iter().any(|m| m.content.contains(marker)) {
            return Err(ChatModelError::Provider("upstream unavailable".into()));
        }
        grounded(messages)
    })
}

fn orchestrator(chat: Arc<RuleChat>) -> Orchestrator {
    Orchestrator::new(
        chat,
        "abcd",
        Arc::new(HashingEmbedder::default()),
        QaSettings::default(),
    )
}

fn sky_corpus() -> Vec<UploadedFile> {
    vec![UploadedFile::new("sky.txt", "The sky is blue.")]
}

struct Wiki;

#[async_trait]
impl Tool for Wiki {
    fn name(&self) -> &str {
        "wikipedia"
    }
    fn description(&self) -> &str {
        "Encyclopedia lookup"
    }
    async fn call(&self, query: &str) -> anyhow::Result<String> {
        Ok(format!("Summary of {}", query))
    }
}

fn web_tools() -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(Wiki));
    tools
}

#[tokio::test]
async fn answers_from_indexed_document() {
    let chat = grounded_chat();
    let qa = orchestrator(chat.clone());
    let outcome = qa.refresh_corpus(&sky_corpus(), &Utf8Loader).await.unwrap();
    assert!(outcome.rebuilt);
    assert_eq!(outcome.snapshot.len(), 1);

    let reply = qa.ask("default_session", "What color is the sky?").await.unwrap();
    assert!(reply.answer.contains("Blue"));
    assert_eq!(reply.source_chunks[0].source_id, "sky.txt");
    assert!(reply.agent_answer.is_none());

    let turns = qa.history().get_or_create("default_session").unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].role, Role::Human);
    assert_eq!(turns[0].content, "What color is the sky?");
    assert_eq!(turns[1].role, Role::Assistant);
}

#[tokio::test]
async fn unanswerable_question_gets_sentinel() {
    let qa = orchestrator(grounded_chat());
    qa.refresh_corpus(&sky_corpus(), &Utf8Loader).await.unwrap();
    let reply = qa.ask("s1", "What is the capital of Mars?").await.unwrap();
    assert_eq!(reply.answer, "I don't know");
}

#[tokio::test]
async fn no_index_without_tools_fails_before_any_model_call() {
    let chat = grounded_chat();
    let qa = orchestrator(chat.clone());
    let err = qa.ask("s1", "anything").await.unwrap_err();
    assert!(matches!(err, QaError::NoIndex));
    assert_eq!(chat.calls(), 0);
    assert_eq!(qa.history().len("s1"), 0);
}

#[tokio::test]
async fn two_questions_leave_four_turns() {
    let qa = orchestrator(grounded_chat());
    qa.refresh_corpus(&sky_corpus(), &Utf8Loader).await.unwrap();
    qa.ask("s1", "What color is the sky?").await.unwrap();
    qa.ask("s1", "Is the sky really that color?").await.unwrap();

    assert_eq!(qa.history().len("s1"), 4);
    assert!(qa.history().get_or_create("s2").unwrap().is_empty());
}

#[tokio::test]
async fn failed_question_leaves_history_unchanged() {
    let qa = orchestrator(grounded_chat());
    qa.refresh_corpus(&sky_corpus(), &Utf8Loader).await.unwrap();
    qa.ask("s1", "What color is the sky?").await.unwrap();

    let mut qa = qa;
    let failing = RuleChat::new(|_| Err(ChatModelError::Auth("expired key".into())));
    qa.set_chat_model(failing, "zzzz");
    let err = qa.ask("s1", "And now?").await.unwrap_err();
    assert!(matches!(err, QaError::Chat(ChatModelError::Auth(_))));
    assert_eq!(qa.history().len("s1"), 2);
}

#[tokio::test]
async fn empty_session_id_is_rejected() {
    let qa = orchestrator(grounded_chat());
    qa.refresh_corpus(&sky_corpus(), &Utf8Loader).await.unwrap();
    let err = qa.ask("  ", "q").await.unwrap_err();
    assert!(matches!(err, QaError::InvalidSession(_)));
    assert!(qa.history().session_ids().is_empty());
}

#[tokio::test]
async fn unchanged_corpus_is_not_reembedded() {
    let qa = orchestrator(grounded_chat());
    let first = qa.refresh_corpus(&sky_corpus(), &Utf8Loader).await.unwrap();
    let second = qa.refresh_corpus(&sky_corpus(), &Utf8Loader).await.unwrap();
    assert!(!second.rebuilt);
    assert!(Arc::ptr_eq(&first.snapshot, &second.snapshot));
}

#[tokio::test]
async fn tools_combine_answers_and_commit_once() {
    let mut qa = orchestrator(grounded_chat());
    qa.set_tools(Some(web_tools()));
    qa.refresh_corpus(&sky_corpus(), &Utf8Loader).await.unwrap();

    let reply = qa.ask("s1", "What color is the sky?").await.unwrap();
    assert_eq!(reply.document_answer.as_deref(), Some("Blue."));
    assert_eq!(
        reply.agent_answer.as_deref(),
        Some("Rayleigh scattering makes it blue.")
    );
    assert_eq!(reply.answer, "Blue, because of Rayleigh scattering.");

    let turns = qa.history().get_or_create("s1").unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[1].content, reply.answer);

    let agent = qa.cached_agent().unwrap();
    assert_eq!(agent.tools().names(), vec!["pdf_qa", "wikipedia"]);
    assert_eq!(agent.memory().unwrap().turns(), turns.as_slice());
}

#[tokio::test]
async fn tools_without_index_synthesize_agent_answer_alone() {
    let chat = grounded_chat();
    let mut qa = orchestrator(chat.clone());
    qa.set_tools(Some(web_tools()));

    let reply = qa.ask("s1", "Why is the sky blue?").await.unwrap();
    assert_eq!(reply.answer, "Rayleigh scattering.");
    assert_eq!(
        reply.agent_answer.as_deref(),
        Some("Rayleigh scattering makes it blue.")
    );
    assert!(reply.document_answer.is_none());
    // One agent step, one synthesis.
    assert_eq!(chat.calls(), 2);
    assert_eq!(qa.cached_agent().unwrap().tools().names(), vec!["wikipedia"]);
}

#[tokio::test]
async fn agent_is_rebuilt_only_when_its_inputs_change() {
    let mut qa = orchestrator(grounded_chat());
    qa.set_tools(Some(web_tools()));
    qa.refresh_corpus(&sky_corpus(), &Utf8Loader).await.unwrap();

    qa.ask("s1", "What color is the sky?").await.unwrap();
    let first = qa.cached_agent().unwrap();
    qa.ask("s1", "Is the sky blue?").await.unwrap();
    assert!(Arc::ptr_eq(&first, &qa.cached_agent().unwrap()));

    // New session: fresh agent seeded from that session's (empty) history.
    qa.ask("s2", "What color is the sky?").await.unwrap();
    let second = qa.cached_agent().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(qa.cached_agent_key().unwrap().session_id, "s2");
    assert_eq!(second.memory().unwrap().turns().len(), 2);

    // New corpus.
    qa.refresh_corpus(&[UploadedFile::new("grass.txt", "Grass is green.")], &Utf8Loader)
        .await
        .unwrap();
    qa.ask("s2", "What color is grass?").await.unwrap();
    let third = qa.cached_agent().unwrap();
    assert!(!Arc::ptr_eq(&second, &third));

    // New credentials.
    qa.set_chat_model(grounded_chat(), "wxyz");
    assert!(qa.cached_agent().is_none());
    qa.ask("s2", "What color is grass?").await.unwrap();
    assert_eq!(qa.cached_agent_key().unwrap().credential_tag, "wxyz");
}

#[tokio::test]
async fn unreadable_corpus_counts_as_no_index() {
    let chat = grounded_chat();
    let qa = orchestrator(chat.clone());
    let outcome = qa
        .refresh_corpus(&[UploadedFile::new("bad.bin", vec![0xffu8, 0xfe])], &Utf8Loader)
        .await
        .unwrap();
    assert_eq!(outcome.failures.len(), 1);
    assert!(qa.active_index().unwrap().is_empty());

    let err = qa.ask("s1", "What color is the sky?").await.unwrap_err();
    assert!(matches!(err, QaError::NoIndex));
    assert_eq!(chat.calls(), 0);
    assert_eq!(qa.history().len("s1"), 0);
}

#[tokio::test]
async fn unparseable_agent_keeps_document_answer() {
    let chat = RuleChat::new(|messages| {
        if system(messages).starts_with("Answer the following questions") {
            return Ok("I think it is blue".into());
        }
        grounded(messages)
    });
    let mut qa = orchestrator(chat.clone());
    qa.set_tools(Some(web_tools()));
    qa.refresh_corpus(&sky_corpus(), &Utf8Loader).await.unwrap();

    let reply = qa.ask("s1", "What color is the sky?").await.unwrap();
    assert_eq!(reply.document_answer.as_deref(), Some("Blue."));
    assert_eq!(reply.agent_answer.as_deref(), Some(ITERATION_LIMIT_ANSWER));
    assert_eq!(reply.answer, "Blue, because of Rayleigh scattering.");
    assert_eq!(qa.history().len("s1"), 2);
    // Document answer, first attempt plus three retries, synthesis.
    assert_eq!(chat.calls(), 6);
}

#[tokio::test]
async fn agent_failure_commits_nothing() {
    let fail = Arc::new(AtomicBool::new(false));
    let mut qa = orchestrator(failing_on("Answer the following questions", fail.clone()));
    qa.set_tools(Some(web_tools()));
    qa.refresh_corpus(&sky_corpus(), &Utf8Loader).await.unwrap();
    qa.ask("s1", "What color is the sky?").await.unwrap();
    let agent = qa.cached_agent().unwrap();

    fail.store(true, Ordering::SeqCst);
    let err = qa.ask("s1", "Is the sky blue at night?").await.unwrap_err();
    assert!(matches!(err, QaError::Chat(ChatModelError::Provider(_))));

    let turns = qa.history().get_or_create("s1").unwrap();
    assert_eq!(turns.len(), 2);
    assert!(Arc::ptr_eq(&agent, &qa.cached_agent().unwrap()));
    assert_eq!(agent.memory().unwrap().turns(), turns.as_slice());
}

#[tokio::test]
async fn synthesis_failure_commits_nothing() {
    let fail = Arc::new(AtomicBool::new(false));
    let chat = failing_on("Final combined answer:", fail.clone());
    let mut qa = orchestrator(chat.clone());
    qa.set_tools(Some(web_tools()));
    qa.refresh_corpus(&sky_corpus(), &Utf8Loader).await.unwrap();
    qa.ask("s1", "What color is the sky?").await.unwrap();
    let agent = qa.cached_agent().unwrap();

    fail.store(true, Ordering::SeqCst);
    let before = chat.calls();
    let err = qa.ask("s1", "Is the sky blue at night?").await.unwrap_err();
    assert!(matches!(err, QaError::Chat(ChatModelError::Provider(_))));
    // Rewrite, document answer and agent step all ran before synthesis failed.
    assert_eq!(chat.calls() - before, 4);

    let turns = qa.history().get_or_create("s1").unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(agent.memory().unwrap().turns(), turns.as_slice());
}
