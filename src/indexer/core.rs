use crate::db::models::{Chunk, ChunkMetadata, scope_or_global};
use crate::indexer::chunker::TextSplitter;
use crate::indexer::diff::{FileChange, diff, load_baseline};
use crate::indexer::loader::{FileReadError, load_text};
use crate::indexer::scanner::{FileRecord, enumerate, resolve_root};
use crate::store::{IndexStore, IndexStoreError};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error(transparent)]
    Store(#[from] IndexStoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
    pub path: String,
    pub error: String,
}

/// Outcome of one delta scan.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct DeltaSummary {
    /// Chunks staged and upserted by this scan.
    pub indexed_chunks: usize,
    pub new_files: usize,
    pub updated_files: usize,
    pub deleted_files: usize,
    pub discovered_files: usize,
    pub supported_files: usize,
    pub unchanged_files: usize,
    /// New files whose text produced no chunks.
    pub empty_files: usize,
    pub failed_files: Vec<FailedFile>,
    pub root_missing: bool,
}

impl DeltaSummary {
    fn fail(&mut self, path: &str, error: &FileReadError) {
        warn!("Skipping {path}: {error}");
        self.failed_files.push(FailedFile {
            path: path.to_string(),
            error: error.to_string(),
        });
    }
}

/// One mutex per canonical scan root.
#[derive(Clone, Default)]
pub struct ScanLocks {
    roots: Arc<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>>,
}

impl ScanLocks {
    fn lock_for(&self, root: &Path) -> Arc<Mutex<()>> {
        let mut roots = self.roots.lock().unwrap_or_else(PoisonError::into_inner);
        roots.entry(root.to_path_buf()).or_default().clone()
    }
}

/// Reconciles a directory tree with an index store.
///
/// Clones share the store and the per-root locks, so concurrent scans of the
/// same root through any clone run one after another.
#[derive(Clone)]
pub struct DeltaIndexer {
    store: Arc<dyn IndexStore>,
    splitter: TextSplitter,
    locks: ScanLocks,
}

impl DeltaIndexer {
    pub fn new(store: Arc<dyn IndexStore>, splitter: TextSplitter) -> Self {
        Self {
            store,
            splitter,
            locks: ScanLocks::default(),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn IndexStore> {
        &self.store
    }

    /// Run one delta scan of `root`, tagging new chunks with `user_id`
    /// (the global scope when `None`).
    pub fn run(&self, root: &Path, user_id: Option<&str>) -> Result<DeltaSummary, ScanError> {
        let root = resolve_root(root);
        let lock = self.locks.lock_for(&root);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        info!("Delta scan started: {}", root.display());

        let baseline = load_baseline(self.store.as_ref())?;
        let listing = enumerate(&root);

        let mut summary = DeltaSummary {
            root_missing: listing.root_missing,
            discovered_files: listing.discovered.len(),
            ..DeltaSummary::default()
        };

        let mut records = Vec::new();
        for path in listing.supported() {
            summary.supported_files += 1;
            match FileRecord::capture(path) {
                Ok(record) => records.push(record),
                Err(e) => summary.fail(&path.to_string_lossy(), &e),
            }
        }

        info!(
            discovered = summary.discovered_files,
            supported = summary.supported_files,
            baseline = baseline.len(),
            "Enumerated {}",
            root.display()
        );

        let classification = diff(records, &listing.discovered_keys(), &baseline, &listing.root);
        let scope = scope_or_global(user_id);
        let mut staged: Vec<Chunk> = Vec::new();

        for (record, change) in classification.changes {
            match change {
                FileChange::Unchanged => {
                    debug!("Unchanged: {}", record.key);
                    summary.unchanged_files += 1;
                }
                FileChange::New => match self.build_chunks(&record, &scope) {
                    Ok(chunks) if chunks.is_empty() => {
                        debug!("No text in new file {}", record.key);
                        summary.empty_files += 1;
                    }
                    Ok(chunks) => {
                        debug!("New: {} ({} chunks)", record.key, chunks.len());
                        summary.new_files += 1;
                        staged.extend(chunks);
                    }
                    Err(e) => summary.fail(&record.key, &e),
                },
                FileChange::Updated => match self.build_chunks(&record, &scope) {
                    Ok(chunks) => {
                        let removed = self.store.delete_by_path(&record.key)?;
                        debug!(
                            "Updated: {} ({removed} stale, {} new chunks)",
                            record.key,
                            chunks.len()
                        );
                        summary.updated_files += 1;
                        staged.extend(chunks);
                    }
                    Err(e) => summary.fail(&record.key, &e),
                },
            }
        }

        if summary.root_missing {
            if !classification.deleted.is_empty() {
                warn!(
                    "Root missing, keeping {} indexed paths under {}",
                    classification.deleted.len(),
                    root.display()
                );
            }
        } else {
            for key in &classification.deleted {
                let removed = self.store.delete_by_path(key)?;
                debug!("Deleted: {key} ({removed} chunks)");
                summary.deleted_files += 1;
            }
        }

        self.store.upsert(&staged)?;
        summary.indexed_chunks = staged.len();

        info!(
            new = summary.new_files,
            updated = summary.updated_files,
            deleted = summary.deleted_files,
            chunks = summary.indexed_chunks,
            failed = summary.failed_files.len(),
            "Delta scan finished: {}",
            root.display()
        );

        Ok(summary)
    }

    fn build_chunks(&self, record: &FileRecord, scope: &str) -> Result<Vec<Chunk>, FileReadError> {
        let text = load_text(&record.path)?;
        let file_name = record.file_name();

        Ok(self
            .splitter
            .split(&text)
            .into_iter()
            .enumerate()
            .map(|(chunk_index, content)| Chunk {
                content,
                metadata: ChunkMetadata {
                    path: record.key.clone(),
                    file_name: file_name.clone(),
                    fingerprint: record.fingerprint.clone(),
                    created_at: record.created_at,
                    modified_at: record.modified_at,
                    user_id: scope.to_string(),
                    chunk_index,
                },
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::mock::MockEmbedder;
    use crate::store::memory::MemoryIndexStore;
    use std::fs;
    use tempfile::tempdir;

    fn indexer() -> (DeltaIndexer, Arc<MemoryIndexStore>) {
        let store = Arc::new(MemoryIndexStore::new(Arc::new(MockEmbedder::new(16))));
        let indexer = DeltaIndexer::new(store.clone(), TextSplitter::new(50, 10));
        (indexer, store)
    }

    #[test]
    fn test_indexer_differential_sync() {
        let temp_dir = tempdir().unwrap();
        let dir_path = temp_dir.path();

        fs::write(dir_path.join("file1.md"), "Content 1").unwrap();
        fs::write(dir_path.join("file2.txt"), "Content 2").unwrap();
        fs::write(dir_path.join("ignored.rs"), "fn main() {}").unwrap();

        let (indexer, store) = indexer();

        // First sync
        let res1 = indexer.run(dir_path, None).unwrap();
        assert_eq!(res1.new_files, 2);
        assert_eq!(res1.indexed_chunks, 2);
        assert_eq!(res1.discovered_files, 3);
        assert_eq!(res1.supported_files, 2);

        // Second sync immediately - should skip both
        let res2 = indexer.run(dir_path, None).unwrap();
        assert_eq!(res2.new_files, 0);
        assert_eq!(res2.updated_files, 0);
        assert_eq!(res2.deleted_files, 0);
        assert_eq!(res2.unchanged_files, 2);
        assert_eq!(res2.indexed_chunks, 0);

        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_update_replaces_chunks() {
        let temp_dir = tempdir().unwrap();
        let file = temp_dir.path().join("doc.md");
        fs::write(&file, "short").unwrap();

        let (indexer, store) = indexer();
        indexer.run(temp_dir.path(), None).unwrap();

        let long = "A sentence that is long enough. ".repeat(10);
        fs::write(&file, &long).unwrap();
        let res = indexer.run(temp_dir.path(), None).unwrap();
        assert_eq!(res.updated_files, 1);

        let key = crate::indexer::scanner::path_key(&resolve_root(&file));
        let chunks = store.chunks_for(&key);
        assert_eq!(chunks.len(), res.indexed_chunks);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.content != "short"));
        let indices: Vec<usize> = chunks.iter().map(|c| c.metadata.chunk_index).collect();
        assert_eq!(indices, (0..chunks.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_file_is_not_new() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("blank.txt"), "  \n ").unwrap();

        let (indexer, store) = indexer();
        let res = indexer.run(temp_dir.path(), None).unwrap();
        assert_eq!(res.new_files, 0);
        assert_eq!(res.empty_files, 1);
        assert!(store.is_empty());

        let again = indexer.run(temp_dir.path(), None).unwrap();
        assert_eq!(again.new_files + again.updated_files + again.deleted_files, 0);
    }

    #[test]
    fn test_missing_root_keeps_index() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().join("docs");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("a.md"), "hello").unwrap();

        let (indexer, store) = indexer();
        indexer.run(&root, None).unwrap();
        assert_eq!(store.len(), 1);

        fs::remove_dir_all(&root).unwrap();
        let res = indexer.run(&root, None).unwrap();
        assert!(res.root_missing);
        assert_eq!(res.deleted_files, 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_scope_is_recorded() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("a.md"), "hello").unwrap();

        let (indexer, store) = indexer();
        indexer.run(temp_dir.path(), Some("alice")).unwrap();

        let meta = store.fetch_all_metadata().unwrap();
        assert_eq!(meta[0].user_id, "alice");
    }

    #[test]
    fn test_broken_new_pdf_is_isolated() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("ok.md"), "fine").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "also fine").unwrap();
        fs::write(temp_dir.path().join("broken.pdf"), "not really a pdf").unwrap();

        let (indexer, store) = indexer();
        let res = indexer.run(temp_dir.path(), None).unwrap();
        assert_eq!(res.new_files, 2);
        assert_eq!(res.failed_files.len(), 1);
        assert!(res.failed_files[0].path.ends_with("broken.pdf"));
        assert_eq!(store.len(), 2);

        // Still failing, still not indexed, siblings untouched
        let again = indexer.run(temp_dir.path(), None).unwrap();
        assert_eq!(again.failed_files.len(), 1);
        assert_eq!(again.unchanged_files, 2);
        assert_eq!(again.new_files, 0);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_failed_reread_keeps_old_chunks() {
        let temp_dir = tempdir().unwrap();
        let pdf = temp_dir.path().join("manual.pdf");
        fs::write(&pdf, "garbage bytes, not a pdf").unwrap();
        let key = crate::indexer::scanner::path_key(&resolve_root(&pdf));

        let (indexer, store) = indexer();
        let now = chrono::Utc::now();
        store
            .upsert(&[Chunk {
                content: "text from the previous revision".into(),
                metadata: ChunkMetadata {
                    path: key.clone(),
                    file_name: "manual.pdf".into(),
                    fingerprint: "fingerprint-of-previous-revision".into(),
                    created_at: now,
                    modified_at: now,
                    user_id: "global".into(),
                    chunk_index: 0,
                },
            }])
            .unwrap();

        let res = indexer.run(temp_dir.path(), None).unwrap();
        assert_eq!(res.updated_files, 0);
        assert_eq!(res.deleted_files, 0);
        assert_eq!(res.failed_files.len(), 1);
        assert_eq!(res.failed_files[0].path, key);

        let chunks = store.chunks_for(&key);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "text from the previous revision");
        assert_eq!(
            chunks[0].metadata.fingerprint,
            "fingerprint-of-previous-revision"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_file_is_isolated() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("ok.md"), "fine").unwrap();
        let locked = temp_dir.path().join("locked.md");
        fs::write(&locked, "secret").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Root can read anything; nothing to test then
        if fs::read(&locked).is_ok() {
            return;
        }

        let (indexer, _store) = indexer();
        let res = indexer.run(temp_dir.path(), None).unwrap();
        assert_eq!(res.new_files, 1);
        assert_eq!(res.failed_files.len(), 1);
        assert!(res.failed_files[0].path.ends_with("locked.md"));
    }
}
