//! Text extraction for uploaded documents.
//!
//! [`FileLoader`] is the application's [`DocumentLoader`]: it picks an
//! extractor from the file extension and returns the whole document as one
//! [`SourceText`] named after the file. [`collect_files`] turns command-line
//! paths (files or directories) into [`UploadedFile`]s.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use docqa_core::error::LoadError;
use docqa_core::loader::DocumentLoader;
use docqa_core::models::{SourceText, UploadedFile};

/// Extensions [`FileLoader`] understands.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "md"];

/// Extraction error. Never fatal for a batch: the file is skipped and reported.
#[derive(Debug)]
pub enum ExtractError {
    UnsupportedExtension(String),
    Pdf(String),
    Utf8(String),
    Empty,
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedExtension(ext) => {
                write!(f, "unsupported file type: '{}'", ext)
            }
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Utf8(e) => write!(f, "not valid UTF-8 text: {}", e),
            ExtractError::Empty => write!(f, "no extractable text"),
        }
    }
}

impl std::error::Error for ExtractError {}

fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Extract plain text from `bytes`, choosing the extractor by file name.
pub fn extract_text(bytes: &[u8], name: &str) -> Result<String, ExtractError> {
    let text = match extension_of(name).as_str() {
        "pdf" => extract_pdf(bytes)?,
        "txt" | "md" => std::str::from_utf8(bytes)
            .map_err(|e| ExtractError::Utf8(e.to_string()))?
            .to_string(),
        other => return Err(ExtractError::UnsupportedExtension(other.to_string())),
    };

    if text.trim().is_empty() {
        return Err(ExtractError::Empty);
    }
    Ok(text)
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

/// Loads PDFs and plain-text files.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileLoader;

impl DocumentLoader for FileLoader {
    fn load(&self, bytes: &[u8], name: &str) -> Result<Vec<SourceText>, LoadError> {
        let text = extract_text(bytes, name).map_err(|e| LoadError::new(name, e.to_string()))?;
        debug!(file = name, chars = text.chars().count(), "extracted text");
        Ok(vec![SourceText::new(name, text)])
    }
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Read `paths` into uploaded files, in the order given.
///
/// Directories are walked recursively and contribute their supported files
/// in sorted order. Files named explicitly are always included, so an
/// unsupported one surfaces as a load failure rather than vanishing. Files
/// are named by their file name, matching what a user would upload.
pub fn collect_files(paths: &[PathBuf]) -> Result<Vec<UploadedFile>> {
    let mut resolved = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file() && is_supported(e.path()))
                .map(|e| e.into_path())
                .collect();
            found.sort();
            resolved.extend(found);
        } else {
            resolved.push(path.clone());
        }
    }

    resolved
        .into_iter()
        .map(|path| {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("Failed to read document: {}", path.display()))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            Ok(UploadedFile::new(name, bytes))
        })
        .collect()
}
