//! Document loader trait.
//!
//! A loader turns the raw bytes of one uploaded file into an ordered list of
//! [`SourceText`]s. The PDF and plain-text loaders live in the `docqa`
//! application crate; tests use in-memory loaders.

use crate::error::LoadError;
use crate::models::SourceText;

pub trait DocumentLoader: Send + Sync {
    /// Extract text segments from `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] for unreadable, corrupt or unsupported input.
    /// Callers skip the file and report the error; other files in the same
    /// batch are still indexed.
    fn load(&self, bytes: &[u8], name: &str) -> Result<Vec<SourceText>, LoadError>;
}

/// Loader that treats every file as UTF-8 text with the file name as source id.
#[derive(Debug, Default, Clone, Copy)]
pub struct Utf8Loader;

impl DocumentLoader for Utf8Loader {
    fn load(&self, bytes: &[u8], name: &str) -> Result<Vec<SourceText>, LoadError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| LoadError::new(name, format!("not valid UTF-8: {}", e)))?;
        Ok(vec![SourceText::new(name, text)])
    }
}
