//! # docqa core
//!
//! Transport-free logic for conversational document QA: chunking, the
//! in-memory vector index, session history, history-aware retrieval, the
//! tool-using agent, answer synthesis and the [`orchestrator`] that ties them
//! together.
//!
//! This crate performs no network or filesystem I/O of its own. Chat models,
//! embedders, document loaders and web tools are plugged in through the
//! [`llm::ChatModel`], [`embedding::Embedder`], [`loader::DocumentLoader`] and
//! [`agent::Tool`] traits; the `docqa` application crate provides the real
//! implementations.

pub mod agent;
pub mod chunk;
pub mod conversation;
pub mod embedding;
pub mod error;
pub mod history;
pub mod index;
pub mod llm;
pub mod loader;
pub mod models;
pub mod orchestrator;
pub mod rag;
pub mod rewrite;
pub mod synth;

pub use error::{QaError, Result};
