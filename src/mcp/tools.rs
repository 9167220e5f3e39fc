/// MCP Tool handlers for ragdelta.
///
/// 1. embed           – delta-scan the index root into the vector index
/// 2. search          – retrieve chunks and optionally generate an answer
/// 3. get_document    – full text of a document under the index root
/// 4. save_document   – write the next version of a document
/// 5. resolve_latest  – find the latest version of a document
/// 6. list_documents  – per-path summary of the index
///
/// Scans, searches and provider calls block, so every handler runs its work
/// on the blocking thread pool.
use crate::documents::{self, DocumentError};
use crate::indexer::ScanError;
use crate::mcp::server::McpContext;
use crate::rag::QueryError;
use crate::store::IndexStoreError;
use rmcp::handler::server::ServerHandler;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{ErrorData as McpError, handler::server::tool::ToolRouter, model::*, tool, tool_router};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::error;

// ── Parameter structs ────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
struct EmbedParams {
    /// Scope new chunks to this user (default: global)
    user_id: Option<String>,
}

#[derive(Deserialize, JsonSchema)]
struct SearchParams {
    /// Search query (natural language)
    q: String,
    /// Only return chunks indexed for this user
    user_id: Option<String>,
    /// Generate an answer from the retrieved chunks (default: true)
    with_answer: Option<bool>,
}

#[derive(Deserialize, JsonSchema)]
struct FilePathParam {
    /// Document path, absolute or relative to the index root
    file_path: String,
}

#[derive(Deserialize, JsonSchema)]
struct SaveDocumentParams {
    /// Document to version, absolute or relative to the index root
    file_path: String,
    /// Full content of the new version
    content: String,
}

// ── Error classification ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidRequest,
    NotFound,
    IndexStore,
    Provider,
    Internal,
}

/// A user-visible tool failure. `message` never carries provider or
/// database text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolFailure {
    pub error: FailureKind,
    pub message: String,
}

impl ToolFailure {
    fn new(error: FailureKind, message: &str) -> Self {
        Self {
            error,
            message: message.to_string(),
        }
    }
}

impl From<&IndexStoreError> for ToolFailure {
    fn from(e: &IndexStoreError) -> Self {
        match e {
            IndexStoreError::Embedding(_) => {
                Self::new(FailureKind::Provider, "Embedding provider request failed.")
            }
            _ => Self::new(FailureKind::IndexStore, "Index store operation failed."),
        }
    }
}

impl From<&ScanError> for ToolFailure {
    fn from(e: &ScanError) -> Self {
        match e {
            ScanError::Store(inner) => inner.into(),
        }
    }
}

impl From<&QueryError> for ToolFailure {
    fn from(e: &QueryError) -> Self {
        match e {
            QueryError::Empty | QueryError::TooLong | QueryError::Prohibited => {
                Self::new(FailureKind::InvalidRequest, &e.to_string())
            }
            QueryError::Store(inner) => inner.into(),
            QueryError::Generation(_) => {
                Self::new(FailureKind::Provider, "Language model request failed.")
            }
        }
    }
}

impl From<&DocumentError> for ToolFailure {
    fn from(e: &DocumentError) -> Self {
        match e {
            DocumentError::OutsideRoot(_) | DocumentError::NotAFile(_) => {
                Self::new(FailureKind::InvalidRequest, &e.to_string())
            }
            DocumentError::NotFound(_) => Self::new(FailureKind::NotFound, &e.to_string()),
            DocumentError::Read(_) | DocumentError::Io(_) => {
                Self::new(FailureKind::Internal, "Failed to load document.")
            }
        }
    }
}

// ── Response helpers ─────────────────────────────────────────────────

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(format!("serialize failed: {e}"), None))?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

fn failure_result<E>(tool: &str, e: &E) -> Result<CallToolResult, McpError>
where
    E: std::error::Error,
    for<'a> ToolFailure: From<&'a E>,
{
    error!("{tool} failed: {e}");
    let failure = ToolFailure::from(e);
    let text = serde_json::to_string(&failure).unwrap_or_else(|_| failure.message.clone());
    Ok(CallToolResult::error(vec![Content::text(text)]))
}

fn error_result(msg: &str) -> Result<CallToolResult, McpError> {
    let failure = ToolFailure::new(FailureKind::InvalidRequest, msg);
    let text = serde_json::to_string(&failure).unwrap_or_else(|_| msg.to_string());
    Ok(CallToolResult::error(vec![Content::text(text)]))
}

async fn blocking<T, F>(work: F) -> Result<T, McpError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| McpError::internal_error(format!("worker task failed: {e}"), None))
}

// ── Tool implementations ─────────────────────────────────────────────

#[derive(Clone)]
pub struct AppTools {
    pub ctx: McpContext,
    pub tool_router: ToolRouter<Self>,
}

impl ServerHandler for AppTools {}

#[tool_router]
impl AppTools {
    pub fn new(ctx: McpContext) -> Self {
        Self {
            ctx,
            tool_router: Self::tool_router(),
        }
    }

    // ── Tool 1: embed ───────────────────────────────────────────────

    #[tool(
        description = "Incrementally index the document root: only new or changed files are embedded and chunks of deleted files are removed"
    )]
    async fn embed(&self, params: Parameters<EmbedParams>) -> Result<CallToolResult, McpError> {
        let user_id = params.0.user_id;
        let indexer = self.ctx.indexer.clone();
        let root = self.ctx.config.index_root();

        let outcome = blocking(move || indexer.run(&root, user_id.as_deref())).await?;

        match outcome {
            Ok(summary) => json_result(&serde_json::json!({
                "indexed_documents": summary.indexed_chunks,
                "new_files": summary.new_files,
                "updated_files": summary.updated_files,
                "deleted_files": summary.deleted_files,
                "unchanged_files": summary.unchanged_files,
                "empty_files": summary.empty_files,
                "failed_files": summary.failed_files,
                "root_missing": summary.root_missing,
            })),
            Err(e) => failure_result("embed", &e),
        }
    }

    // ── Tool 2: search ──────────────────────────────────────────────

    #[tool(
        description = "Semantic search over indexed documents. Returns the best matching snippets and, unless with_answer is false, an answer grounded in them."
    )]
    async fn search(&self, params: Parameters<SearchParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let rag = self.ctx.rag.clone();
        let with_answer = p.with_answer.unwrap_or(true);

        let outcome = blocking(move || rag.search(&p.q, p.user_id.as_deref(), with_answer)).await?;

        match outcome {
            Ok(response) => json_result(&response),
            Err(e) => failure_result("search", &e),
        }
    }

    // ── Tool 3: get_document ────────────────────────────────────────

    #[tool(description = "Return the full text of a document under the index root")]
    async fn get_document(
        &self,
        params: Parameters<FilePathParam>,
    ) -> Result<CallToolResult, McpError> {
        let file_path = params.0.file_path;
        if file_path.trim().is_empty() {
            return error_result("file_path is required");
        }
        let root = self.ctx.config.index_root();

        match blocking(move || documents::read_document(&root, &file_path)).await? {
            Ok(doc) => json_result(&doc),
            Err(e) => failure_result("get_document", &e),
        }
    }

    // ── Tool 4: save_document ───────────────────────────────────────

    #[tool(
        description = "Save content as the next version of a document (report.md -> report__v1.md -> report__v2.md). Existing versions are never modified."
    )]
    async fn save_document(
        &self,
        params: Parameters<SaveDocumentParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        if p.file_path.trim().is_empty() {
            return error_result("file_path is required");
        }
        let root = self.ctx.config.index_root();

        match blocking(move || documents::save_document(&root, &p.file_path, &p.content)).await? {
            Ok(saved) => json_result(&saved),
            Err(e) => failure_result("save_document", &e),
        }
    }

    // ── Tool 5: resolve_latest ──────────────────────────────────────

    #[tool(description = "Resolve the latest saved version of a document")]
    async fn resolve_latest(
        &self,
        params: Parameters<FilePathParam>,
    ) -> Result<CallToolResult, McpError> {
        let file_path = params.0.file_path;
        if file_path.trim().is_empty() {
            return error_result("file_path is required");
        }
        let root = self.ctx.config.index_root();

        match blocking(move || documents::latest_version(&root, &file_path)).await? {
            Ok(latest) => json_result(&latest),
            Err(e) => failure_result("resolve_latest", &e),
        }
    }

    // ── Tool 6: list_documents ──────────────────────────────────────

    #[tool(description = "List indexed documents with their fingerprint and chunk count")]
    async fn list_documents(&self) -> Result<CallToolResult, McpError> {
        let store = self.ctx.indexer.store().clone();

        match blocking(move || store.document_summaries()).await? {
            Ok(docs) => json_result(&docs),
            Err(e) => failure_result("list_documents", &e),
        }
    }
}
