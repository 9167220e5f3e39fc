//! Query service: validate, retrieve, shape snippets, optionally answer.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::db::models::ScoredChunk;
use crate::generation::prompt::PromptBuilder;
use crate::generation::{GenerationError, Generator};
use crate::store::{IndexStore, IndexStoreError};

pub const MAX_QUERY_CHARS: usize = 1024;
pub const SNIPPET_CHARS: usize = 300;

const PROHIBITED_PATTERNS: &[&str] = &["ignore previous instructions", "delete all data"];

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Query cannot be empty.")]
    Empty,

    #[error("Query is too long.")]
    TooLong,

    #[error("Query contains prohibited patterns.")]
    Prohibited,

    #[error(transparent)]
    Store(#[from] IndexStoreError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Trim `q` and reject empty, overlong, or prohibited queries.
pub fn validate_query(q: &str) -> Result<&str, QueryError> {
    let q = q.trim();
    if q.is_empty() {
        return Err(QueryError::Empty);
    }
    if q.chars().count() > MAX_QUERY_CHARS {
        return Err(QueryError::TooLong);
    }
    let lowered = q.to_lowercase();
    if PROHIBITED_PATTERNS.iter().any(|p| lowered.contains(p)) {
        return Err(QueryError::Prohibited);
    }
    Ok(q)
}

/// First 300 characters on one line, with `...` when cut.
#[must_use]
pub fn snippet(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(SNIPPET_CHARS).collect();
    let mut out = head.replace('\n', " ");
    if chars.next().is_some() {
        out.push_str("...");
    }
    out
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub file_name: String,
    pub file_path: String,
    pub score: f64,
    pub snippet: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl From<&ScoredChunk> for SearchHit {
    fn from(hit: &ScoredChunk) -> Self {
        let meta = &hit.chunk.metadata;
        Self {
            file_name: meta.file_name.clone(),
            file_path: meta.path.clone(),
            score: hit.score,
            snippet: snippet(&hit.chunk.content),
            created_at: meta.created_at,
            modified_at: meta.modified_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchHit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

pub struct RagService {
    store: Arc<dyn IndexStore>,
    generator: Option<Arc<dyn Generator>>,
    top_k: usize,
}

impl RagService {
    pub fn new(
        store: Arc<dyn IndexStore>,
        generator: Option<Arc<dyn Generator>>,
        top_k: usize,
    ) -> Self {
        Self {
            store,
            generator,
            top_k,
        }
    }

    /// Retrieve the nearest chunks for `q` and, when asked and anything was
    /// found, generate an answer grounded in them.
    pub fn search(
        &self,
        q: &str,
        user_id: Option<&str>,
        with_answer: bool,
    ) -> Result<SearchResponse, QueryError> {
        let query = validate_query(q)?;
        let scope = user_id.map(str::trim).filter(|s| !s.is_empty());

        let hits = self.store.search(query, self.top_k, scope)?;
        debug!("Retrieved {} chunks for query", hits.len());

        let answer = match (&self.generator, with_answer && !hits.is_empty()) {
            (Some(generator), true) => {
                let prompt = PromptBuilder::build(query, &hits);
                info!("Generating answer with {}", generator.model());
                Some(generator.generate(&prompt)?)
            }
            _ => None,
        };

        Ok(SearchResponse {
            query: query.to_string(),
            results: hits.iter().map(SearchHit::from).collect(),
            answer,
        })
    }
}
