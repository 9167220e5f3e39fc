//! # ragdelta — Incremental RAG indexing backend
//!
//! Scans a document tree into a vector index, re-embedding only what
//! changed, and serves retrieval and versioned document editing over the
//! Model Context Protocol (MCP).
//!
//! ## Architecture
//!
//! - **[`config`]** — Configuration loading, environment overrides, validation
//! - **[`versioning`]** — `base`, `base__v1`, `base__v2` sibling naming and atomic saves
//! - **[`indexer`]** — Enumeration, fingerprints, diffing, chunking, delta orchestration
//! - **[`store`]** — Index store trait with SQLite (sqlite-vec) and in-memory backends
//! - **[`db`]** — SQLite schema, chunk CRUD and vector search
//! - **[`provider`]** — Embedding / LLM provider selection
//! - **[`embedder`]** / **[`generation`]** — Provider HTTP clients
//! - **[`rag`]** — Query validation, retrieval and answer generation
//! - **[`documents`]** — Root-guarded document reads and versioned saves
//! - **[`mcp`]** — MCP server and tool handlers (stdio transport via rmcp)

pub mod config;
pub mod db;
pub mod documents;
pub mod embedder;
pub mod generation;
pub mod indexer;
pub mod mcp;
pub mod provider;
pub mod rag;
pub mod store;
pub mod versioning;
