//! In-memory vector index with signature-based rebuilds.
//!
//! An [`IndexSnapshot`] is an immutable, point-in-time set of chunks and their
//! embeddings. Search is brute-force cosine similarity over all vectors, which
//! is plenty for the handful of documents a session works with.
//!
//! [`IndexManager`] owns the single active snapshot. Each
//! [`refresh`](IndexManager::refresh) computes a [`CorpusSignature`] from the
//! uploaded file set:
//!
//! - same signature → the active snapshot is reused; nothing is loaded or
//!   embedded;
//! - new signature → every file is loaded, split and embedded into a fresh
//!   snapshot, which then replaces the old one in a single swap.
//!
//! Snapshots are handed out as `Arc`s, so a query that already holds one is
//! never affected by a concurrent swap. Rebuilds are serialized by an async
//! mutex; a failed rebuild leaves the previous snapshot active.

use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::chunk::{split_documents, SplitterConfig};
use crate::embedding::{cosine_similarity, Embedder};
use crate::error::{LoadError, QaError, Result};
use crate::loader::DocumentLoader;
use crate::models::{Chunk, UploadedFile};

/// Identifies one exact corpus: file names and sizes in upload order, plus
/// the embedder model used to index them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorpusSignature(String);

impl CorpusSignature {
    pub fn compute(files: &[UploadedFile], embedder_model: &str) -> Self {
        let listing = files
            .iter()
            .map(|f| format!("{}:{}", f.name, f.size()))
            .collect::<Vec<_>>()
            .join("|");

        let mut hasher = Sha256::new();
        hasher.update(listing.as_bytes());
        hasher.update([0u8]);
        hasher.update(embedder_model.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex digits, for logs and prompts.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for CorpusSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short())
    }
}

/// A chunk returned from [`IndexSnapshot::search`] with its similarity.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

struct IndexEntry {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Immutable chunk + embedding set for one corpus signature.
pub struct IndexSnapshot {
    signature: CorpusSignature,
    embedder_model: String,
    entries: Vec<IndexEntry>,
}

impl IndexSnapshot {
    /// Embed every chunk (order-preserving) and freeze the result.
    ///
    /// Building with zero chunks succeeds and yields an index whose searches
    /// return nothing.
    ///
    /// # Errors
    ///
    /// [`QaError::IndexBuild`] if the embedder fails or returns the wrong
    /// number of vectors or inconsistent dimensions.
    pub async fn build(
        signature: CorpusSignature,
        chunks: Vec<Chunk>,
        embedder: &dyn Embedder,
    ) -> Result<Self> {
        let embedder_model = embedder.model_name().to_string();
        if chunks.is_empty() {
            return Ok(Self {
                signature,
                embedder_model,
                entries: Vec::new(),
            });
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| QaError::IndexBuild(format!("{:#}", e)))?;

        if vectors.len() != chunks.len() {
            return Err(QaError::IndexBuild(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        let dims = vectors[0].len();
        if dims == 0 || vectors.iter().any(|v| v.len() != dims) {
            return Err(QaError::IndexBuild(
                "embedder returned empty or inconsistent vectors".to_string(),
            ));
        }

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry { chunk, vector })
            .collect();

        Ok(Self {
            signature,
            embedder_model,
            entries,
        })
    }

    /// Top-`k` chunks by cosine similarity, most similar first.
    ///
    /// Ties keep the original chunk order. `k` is clamped to the number of
    /// chunks; an empty index returns an empty list.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(query, &e.vector)))
            .collect();

        // `sort_by` is stable, so equal scores stay in corpus order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(k.min(self.entries.len()));

        scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.entries[i].chunk.clone(),
                score,
            })
            .collect()
    }

    pub fn signature(&self) -> &CorpusSignature {
        &self.signature
    }

    pub fn embedder_model(&self) -> &str {
        &self.embedder_model
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|e| &e.chunk)
    }
}

impl fmt::Debug for IndexSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexSnapshot")
            .field("signature", &self.signature.short())
            .field("embedder_model", &self.embedder_model)
            .field("chunks", &self.entries.len())
            .finish()
    }
}

/// Result of [`IndexManager::refresh`].
#[derive(Debug)]
pub struct RefreshOutcome {
    pub snapshot: Arc<IndexSnapshot>,
    /// `false` when the active snapshot was reused.
    pub rebuilt: bool,
    /// Files that were skipped because they could not be loaded.
    pub failures: Vec<LoadError>,
}

/// Holds the process's single active [`IndexSnapshot`].
#[derive(Default)]
pub struct IndexManager {
    active: RwLock<Option<Arc<IndexSnapshot>>>,
    rebuild: futures::lock::Mutex<()>,
}

impl IndexManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The active snapshot, if any corpus has been indexed.
    pub fn active(&self) -> Option<Arc<IndexSnapshot>> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Make sure the active snapshot matches `files`, rebuilding if needed.
    ///
    /// # Errors
    ///
    /// [`QaError::IndexBuild`] if embedding fails; the previously active
    /// snapshot stays in place. Per-file load failures are reported in
    /// [`RefreshOutcome::failures`] instead.
    pub async fn refresh(
        &self,
        files: &[UploadedFile],
        loader: &dyn DocumentLoader,
        splitter: &SplitterConfig,
        embedder: &dyn Embedder,
    ) -> Result<RefreshOutcome> {
        let signature = CorpusSignature::compute(files, embedder.model_name());
        let _rebuilding = self.rebuild.lock().await;

        if let Some(current) = self.active() {
            if current.signature() == &signature {
                debug!(signature = %signature, "corpus unchanged, reusing index");
                return Ok(RefreshOutcome {
                    snapshot: current,
                    rebuilt: false,
                    failures: Vec::new(),
                });
            }
        }

        let mut texts = Vec::new();
        let mut failures = Vec::new();
        for file in files {
            match loader.load(&file.bytes, &file.name) {
                Ok(docs) => texts.extend(docs),
                Err(e) => {
                    warn!(file = %file.name, error = %e.reason, "skipping unreadable document");
                    failures.push(e);
                }
            }
        }

        let chunks = split_documents(&texts, splitter);
        debug!(
            documents = texts.len(),
            chunks = chunks.len(),
            "embedding corpus"
        );
        let snapshot = Arc::new(IndexSnapshot::build(signature, chunks, embedder).await?);

        *self.active.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&snapshot));
        info!(
            signature = %snapshot.signature(),
            chunks = snapshot.len(),
            skipped = failures.len(),
            "index rebuilt"
        );

        Ok(RefreshOutcome {
            snapshot,
            rebuilt: true,
            failures,
        })
    }
}
