//! In-process index store with brute-force cosine search.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{IndexStore, IndexStoreError, check_width, embed_chunks};
use crate::db::models::{Chunk, ChunkMetadata, ScoredChunk};
use crate::embedder::Embedder;

struct Entry {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Holds chunks and their vectors in insertion order. Nothing is persisted.
pub struct MemoryIndexStore {
    entries: Mutex<Vec<Entry>>,
    embedder: Arc<dyn Embedder>,
}

impl MemoryIndexStore {
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            embedder,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Chunks stored for `path`, ordered by chunk index.
    #[must_use]
    pub fn chunks_for(&self, path: &str) -> Vec<Chunk> {
        let mut chunks: Vec<Chunk> = self
            .lock()
            .iter()
            .filter(|e| e.chunk.metadata.path == path)
            .map(|e| e.chunk.clone())
            .collect();
        chunks.sort_by_key(|c| c.metadata.chunk_index);
        chunks
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl IndexStore for MemoryIndexStore {
    fn upsert(&self, chunks: &[Chunk]) -> Result<(), IndexStoreError> {
        if chunks.is_empty() {
            return Ok(());
        }
        let vectors = embed_chunks(self.embedder.as_ref(), chunks)?;

        let mut entries = self.lock();
        for (chunk, vector) in chunks.iter().zip(vectors) {
            entries.push(Entry {
                chunk: chunk.clone(),
                vector,
            });
        }
        Ok(())
    }

    fn delete_by_path(&self, path: &str) -> Result<usize, IndexStoreError> {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|e| e.chunk.metadata.path != path);
        Ok(before - entries.len())
    }

    fn fetch_all_metadata(&self) -> Result<Vec<ChunkMetadata>, IndexStoreError> {
        Ok(self.lock().iter().map(|e| e.chunk.metadata.clone()).collect())
    }

    fn search(
        &self,
        query: &str,
        k: usize,
        scope: Option<&str>,
    ) -> Result<Vec<ScoredChunk>, IndexStoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_vector = self.embedder.embed(query)?;
        check_width(&query_vector, self.embedder.dimensions())?;

        let entries = self.lock();
        let mut scored: Vec<ScoredChunk> = entries
            .iter()
            .filter(|e| scope.is_none_or(|s| e.chunk.metadata.user_id == s))
            .map(|e| ScoredChunk {
                chunk: e.chunk.clone(),
                score: similarity_score(cosine_similarity(&query_vector, &e.vector)),
            })
            .collect();

        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }
}

/// Map cosine similarity from [-1, 1] onto [0, 1], the same scale the
/// SQLite store derives from cosine distance as `1 - d / 2`.
fn similarity_score(cosine: f32) -> f64 {
    (1.0 + f64::from(cosine)) / 2.0
}

/// Cosine similarity of two vectors; 0.0 for empty or mismatched input.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 { 0.0 } else { dot / denom }
}
