//! Vector index behind a narrow interface.
//!
//! The delta scan only needs four operations from an index: upsert chunks,
//! delete every chunk of a path, read back all metadata, and similarity
//! search. [`sqlite::SqliteIndexStore`] is the persistent implementation;
//! [`memory::MemoryIndexStore`] keeps everything in process.
pub mod memory;
pub mod sqlite;

use thiserror::Error;

use std::collections::BTreeMap;

use crate::db::models::{Chunk, ChunkMetadata, DocumentSummary, ScoredChunk};
use crate::embedder::EmbedderError;

/// Chunks are embedded in groups of this size on upsert.
pub const EMBED_BATCH_SIZE: usize = 64;

#[derive(Error, Debug)]
pub enum IndexStoreError {
    #[error("index database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedderError),

    #[error("index holds {index}-dimensional vectors but the embedder produces {embedder}")]
    DimensionMismatch { index: usize, embedder: usize },

    #[error("embedder returned {got} vectors for {expected} texts")]
    MalformedEmbedding { expected: usize, got: usize },

    #[error("index store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub trait IndexStore: Send + Sync {
    /// Embed and persist `chunks`. An empty slice is a no-op.
    fn upsert(&self, chunks: &[Chunk]) -> Result<(), IndexStoreError>;

    /// Remove every chunk whose metadata path equals `path`. Returns the
    /// number removed; deleting an unknown path is not an error.
    fn delete_by_path(&self, path: &str) -> Result<usize, IndexStoreError>;

    fn fetch_all_metadata(&self) -> Result<Vec<ChunkMetadata>, IndexStoreError>;

    /// Up to `k` chunks nearest to `query`, optionally only those whose
    /// `user_id` equals `scope`.
    fn search(
        &self,
        query: &str,
        k: usize,
        scope: Option<&str>,
    ) -> Result<Vec<ScoredChunk>, IndexStoreError>;

    /// One entry per indexed path, sorted by path.
    fn document_summaries(&self) -> Result<Vec<DocumentSummary>, IndexStoreError> {
        Ok(summarize(self.fetch_all_metadata()?))
    }
}

/// Group chunk metadata by path; the last fingerprint seen for a path wins.
pub fn summarize(metadata: Vec<ChunkMetadata>) -> Vec<DocumentSummary> {
    let mut by_path: BTreeMap<String, DocumentSummary> = BTreeMap::new();
    for m in metadata {
        let entry = by_path
            .entry(m.path.clone())
            .or_insert_with(|| DocumentSummary {
                path: m.path,
                fingerprint: String::new(),
                chunks: 0,
            });
        entry.fingerprint = m.fingerprint;
        entry.chunks += 1;
    }
    by_path.into_values().collect()
}

/// Embed chunk contents in batches, checking count and width of every vector.
pub(crate) fn embed_chunks(
    embedder: &dyn crate::embedder::Embedder,
    chunks: &[Chunk],
) -> Result<Vec<Vec<f32>>, IndexStoreError> {
    let mut vectors = Vec::with_capacity(chunks.len());

    for batch in chunks.chunks(EMBED_BATCH_SIZE) {
        let texts: Vec<&str> = batch.iter().map(|c| c.content.as_str()).collect();
        let embedded = embedder.embed_batch(&texts)?;
        if embedded.len() != texts.len() {
            return Err(IndexStoreError::MalformedEmbedding {
                expected: texts.len(),
                got: embedded.len(),
            });
        }
        for v in &embedded {
            check_width(v, embedder.dimensions())?;
        }
        vectors.extend(embedded);
    }

    Ok(vectors)
}

pub(crate) fn check_width(vector: &[f32], expected: usize) -> Result<(), IndexStoreError> {
    if vector.len() == expected {
        Ok(())
    } else {
        Err(IndexStoreError::DimensionMismatch {
            index: expected,
            embedder: vector.len(),
        })
    }
}
