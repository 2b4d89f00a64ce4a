//! Core data models used throughout docqa.
//!
//! These types represent the uploaded files, extracted texts, chunks and chat
//! turns that flow through indexing and question answering.

use serde::{Deserialize, Serialize};

/// A file handed to the system for indexing: its display name and raw bytes.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Text extracted from a loaded document, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceText {
    pub source_id: String,
    pub text: String,
}

impl SourceText {
    pub fn new(source_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            text: text.into(),
        }
    }
}

/// A window of a source document's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub source_id: String,
    /// Window index within the source, starting at 0.
    pub position: usize,
    pub text: String,
}

impl Chunk {
    /// Stable display label, e.g. `report.pdf#3`.
    pub fn label(&self) -> String {
        format!("{}#{}", self.source_id, self.position)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Assistant,
}

/// One message in a session's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
