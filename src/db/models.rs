use chrono::{DateTime, Utc};
use serde::Serialize;

/// Scope assigned to chunks indexed without a user.
pub const GLOBAL_SCOPE: &str = "global";

/// Metadata carried by every stored chunk.
///
/// `path` alone identifies every chunk that belongs to one file, and
/// `fingerprint` records which content produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkMetadata {
    pub path: String,
    pub file_name: String,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub user_id: String,
    pub chunk_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// A chunk returned from similarity search.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f64,
}

/// Per-file view of what the index holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentSummary {
    pub path: String,
    pub fingerprint: String,
    pub chunks: usize,
}

/// Resolve an optional user id to the scope stored in chunk metadata.
#[must_use]
pub fn scope_or_global(user_id: Option<&str>) -> String {
    match user_id.map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => GLOBAL_SCOPE.to_string(),
    }
}
