//! Persistent index store over SQLite + sqlite-vec.
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use super::{IndexStore, IndexStoreError, check_width, embed_chunks};
use crate::db::Db;
use crate::db::models::{Chunk, ChunkMetadata, DocumentSummary, ScoredChunk};
use crate::embedder::Embedder;

pub struct SqliteIndexStore {
    db: Mutex<Db>,
    embedder: Arc<dyn Embedder>,
}

impl SqliteIndexStore {
    /// Open the index file at `path`, creating parent directories as needed.
    ///
    /// An index created for a different embedding width is rejected.
    pub fn open<P: AsRef<Path>>(path: P, embedder: Arc<dyn Embedder>) -> Result<Self, IndexStoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let db = Db::open(path, embedder.dimensions())?;
        Self::with_db(db, embedder)
    }

    pub fn open_in_memory(embedder: Arc<dyn Embedder>) -> Result<Self, IndexStoreError> {
        let db = Db::open_in_memory(embedder.dimensions())?;
        Self::with_db(db, embedder)
    }

    fn with_db(db: Db, embedder: Arc<dyn Embedder>) -> Result<Self, IndexStoreError> {
        if db.dimensions() != embedder.dimensions() {
            return Err(IndexStoreError::DimensionMismatch {
                index: db.dimensions(),
                embedder: embedder.dimensions(),
            });
        }
        Ok(Self {
            db: Mutex::new(db),
            embedder,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Db> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl IndexStore for SqliteIndexStore {
    fn upsert(&self, chunks: &[Chunk]) -> Result<(), IndexStoreError> {
        if chunks.is_empty() {
            return Ok(());
        }

        // Embed before taking the lock
        let vectors = embed_chunks(self.embedder.as_ref(), chunks)?;

        self.lock().insert_chunks(chunks, &vectors)?;
        info!("Upserted {} chunks", chunks.len());
        Ok(())
    }

    fn delete_by_path(&self, path: &str) -> Result<usize, IndexStoreError> {
        let removed = self.lock().delete_by_path(path)?;
        debug!("Deleted {removed} chunks for {path}");
        Ok(removed)
    }

    fn fetch_all_metadata(&self) -> Result<Vec<ChunkMetadata>, IndexStoreError> {
        Ok(self.lock().all_metadata()?)
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

        Ok(self.lock().search(&query_vector, k, scope)?)
    }

    fn document_summaries(&self) -> Result<Vec<DocumentSummary>, IndexStoreError> {
        Ok(self.lock().document_summaries()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::GLOBAL_SCOPE;
    use crate::embedder::mock::MockEmbedder;
    use chrono::Utc;

    fn chunk(path: &str, index: usize, content: &str) -> Chunk {
        let now = Utc::now();
        Chunk {
            content: content.to_string(),
            metadata: ChunkMetadata {
                path: path.to_string(),
                file_name: path.to_string(),
                fingerprint: format!("fp-{path}"),
                created_at: now,
                modified_at: now,
                user_id: GLOBAL_SCOPE.to_string(),
                chunk_index: index,
            },
        }
    }

    #[test]
    fn test_upsert_search_delete() {
        let store = SqliteIndexStore::open_in_memory(Arc::new(MockEmbedder::new(32))).unwrap();
        store
            .upsert(&[
                chunk("a.md", 0, "the quick brown fox"),
                chunk("b.md", 0, "lazy dogs sleep"),
            ])
            .unwrap();

        let hits = store.search("the quick brown fox", 1, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.metadata.path, "a.md");

        assert_eq!(store.delete_by_path("a.md").unwrap(), 1);
        let remaining = store.fetch_all_metadata().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].path, "b.md");
    }

    #[test]
    fn test_upsert_more_than_one_batch() {
        let store = SqliteIndexStore::open_in_memory(Arc::new(MockEmbedder::new(8))).unwrap();
        let chunks: Vec<Chunk> = (0..150)
            .map(|i| chunk("big.md", i, &format!("chunk number {i}")))
            .collect();
        store.upsert(&chunks).unwrap();

        let summaries = store.document_summaries().unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].chunks, 150);
    }

    #[test]
    fn test_reopen_with_other_embedder_width() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index").join("vectors.db");

        SqliteIndexStore::open(&path, Arc::new(MockEmbedder::new(16))).unwrap();
        let err = SqliteIndexStore::open(&path, Arc::new(MockEmbedder::new(24)))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            IndexStoreError::DimensionMismatch {
                index: 16,
                embedder: 24
            }
        ));
    }
}
