//! MCP server exposing indexing, retrieval, and document versioning tools.
pub mod server;
pub mod tools;
