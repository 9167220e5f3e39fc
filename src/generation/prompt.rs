//! Prompt templates for grounded answers

use super::ChatPrompt;
use crate::db::models::ScoredChunk;

pub const SYSTEM_PROMPT: &str = "Answer the user's question using ONLY the provided context. \
If the context is not sufficient to answer safely, say you don't know.";

const NO_CONTEXT: &str = "NO CONTEXT";

/// Prompt builder for retrieval-grounded queries
pub struct PromptBuilder;

impl PromptBuilder {
    /// Build context from search results, one `From <file>:` block per chunk
    pub fn build_context(results: &[ScoredChunk]) -> String {
        results
            .iter()
            .map(|r| format!("From {}: {}", r.chunk.metadata.file_name, r.chunk.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Build the chat prompt for `question` over the retrieved chunks
    pub fn build(question: &str, results: &[ScoredChunk]) -> ChatPrompt {
        let context = Self::build_context(results);
        let context = if context.is_empty() {
            NO_CONTEXT
        } else {
            context.as_str()
        };

        ChatPrompt {
            system: SYSTEM_PROMPT.to_string(),
            user: format!("Question: {question}\n\nContext:\n{context}"),
        }
    }
}
