//! Read and version documents that live under the index root.
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::indexer::loader::{FileReadError, load_text};
use crate::versioning;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Invalid file path.")]
    OutsideRoot(PathBuf),

    #[error("Invalid file path.")]
    NotAFile(PathBuf),

    #[error("Document not found.")]
    NotFound(PathBuf),

    #[error(transparent)]
    Read(#[from] FileReadError),

    #[error("document I/O failed: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentContent {
    pub file_name: String,
    pub file_path: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SavedVersion {
    pub file_path: String,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatestVersion {
    pub file_path: String,
    pub base: String,
    pub version: u64,
}

/// Resolve `file_path` and require it to name a file strictly under `root`.
///
/// Relative paths are taken relative to `root`. The file itself need not
/// exist, but its parent directory must. The root itself and any existing
/// directory are rejected.
pub fn guard_path(root: &Path, file_path: &str) -> Result<PathBuf, DocumentError> {
    let root = std::fs::canonicalize(root)?;
    let requested = Path::new(file_path);
    let requested = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        root.join(requested)
    };

    let resolved = match std::fs::canonicalize(&requested) {
        Ok(p) => p,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let (Some(parent), Some(name)) = (requested.parent(), requested.file_name()) else {
                return Err(DocumentError::NotFound(requested));
            };
            match std::fs::canonicalize(parent) {
                Ok(parent) => parent.join(name),
                Err(_) => return Err(DocumentError::NotFound(requested)),
            }
        }
        Err(e) => return Err(e.into()),
    };

    if !resolved.starts_with(&root) {
        warn!(
            "Rejected document request outside index root. requested={}, root={}",
            resolved.display(),
            root.display()
        );
        return Err(DocumentError::OutsideRoot(resolved));
    }

    if resolved == root || resolved.is_dir() {
        warn!("Rejected document request for a directory: {}", resolved.display());
        return Err(DocumentError::NotAFile(resolved));
    }

    Ok(resolved)
}

/// Full text of a document under `root`, loaded the same way the indexer does.
pub fn read_document(root: &Path, file_path: &str) -> Result<DocumentContent, DocumentError> {
    let path = guard_path(root, file_path)?;
    if !path.is_file() {
        return Err(DocumentError::NotFound(path));
    }

    let content = load_text(&path)?;
    let meta = std::fs::metadata(&path)?;
    let modified_at: DateTime<Utc> = meta.modified()?.into();
    let created_at = meta.created().map(DateTime::<Utc>::from).unwrap_or(modified_at);

    Ok(DocumentContent {
        file_name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        file_path: path.to_string_lossy().into_owned(),
        content,
        created_at,
        modified_at,
    })
}

/// Write `content` as the next version of `file_path` under `root`.
pub fn save_document(
    root: &Path,
    file_path: &str,
    content: &str,
) -> Result<SavedVersion, DocumentError> {
    let path = guard_path(root, file_path)?;
    let saved = versioning::save_new_version(&path, content)?;
    let (_, version) = versioning::parse_version(&saved);

    Ok(SavedVersion {
        file_path: saved.to_string_lossy().into_owned(),
        version,
    })
}

/// Latest sibling version of `file_path` under `root`.
pub fn latest_version(root: &Path, file_path: &str) -> Result<LatestVersion, DocumentError> {
    let path = guard_path(root, file_path)?;
    let latest = versioning::resolve_latest(&path);
    let (base, version) = versioning::parse_version(&latest);

    Ok(LatestVersion {
        file_path: latest.to_string_lossy().into_owned(),
        base,
        version,
    })
}
