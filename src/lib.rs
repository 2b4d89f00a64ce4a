//! # docqa
//!
//! Conversational question answering over your own documents.
//!
//! docqa indexes PDFs and text files into an in-memory vector index, answers
//! questions against them with a chat model, and remembers each session's
//! conversation so follow-up questions can refer to earlier ones. With web
//! tools enabled, a ReAct agent also consults Wikipedia, arXiv and DuckDuckGo
//! and the two answers are merged into one reply.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌────────────────┐
//! │  FileLoader  │──▶│ Chunk+Embed  │──▶│ IndexSnapshot  │
//! │  PDF / text  │   │              │   │  (in memory)   │
//! └──────────────┘   └──────────────┘   └───────┬────────┘
//!                                               │
//!                  ┌────────────────────────────┤
//!                  ▼                            ▼
//!           ┌─────────────┐             ┌──────────────┐
//!           │ RAG answer  │             │  Tool agent  │
//!           │ (+ history) │             │ wiki/arxiv/… │
//!           └──────┬──────┘             └──────┬───────┘
//!                  └────────▶ Synthesizer ◀────┘
//! ```
//!
//! The question-answering pipeline lives in the `docqa-core` crate. This
//! crate supplies the concrete pieces around it: configuration, document
//! extraction, embedding providers, the HTTP chat client, web tools, and
//! the `docqa` CLI.
//!
//! ## Quick Start
//!
//! ```bash
//! export GROQ_API_KEY=gsk_...
//! docqa ask "What does the report conclude?" --docs report.pdf
//! docqa chat --docs ./papers          # interactive, with :commands
//! docqa chunks --docs report.pdf      # inspect the chunk split
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`extract`] | PDF and text extraction, document discovery |
//! | [`embedding`] | Embedding provider implementations |
//! | [`llm`] | OpenAI-compatible chat completions client |
//! | [`tools`] | Wikipedia, arXiv and DuckDuckGo tools |
//! | [`resources`] | Memoized models, embedder and tools |
//! | [`app`] | Session state and REPL commands for the CLI |

pub mod app;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod llm;
pub mod resources;
pub mod tools;
