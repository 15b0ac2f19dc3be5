//! Prompt and context formatting for answer generation.
//!
//! [`build_context`] renders retrieved results as numbered blocks and
//! [`build_prompt`] wraps that context with the persona and the question:
//!
//! ```text
//! {system prompt}
//!
//! Context Information:
//! Document 1 (Relevance: 0.87, Source: classes.md):
//! ...
//!
//! User Question: {question}
//!
//! Response:
//! ```

use serde::Serialize;

use crate::models::RetrievedResult;

/// Rendered in place of context when nothing was retrieved.
pub const NO_CONTEXT_MESSAGE: &str = "No relevant information found in the knowledge base.";

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are FIT-FLIX, an AI assistant for a fitness brand, specialized in fitness, wellness, and health.
Answer helpfully, accurately, and encouragingly using the provided context.

Guidelines:
- Use the provided context to answer questions
- If the context doesn't contain relevant information, say so clearly
- Provide practical, actionable advice when appropriate
- Be encouraging and supportive
- Focus on safety and proper form for exercises
- Recommend consulting professionals when necessary";

/// Render results as numbered context blocks separated by blank lines.
///
/// An empty slice renders as [`NO_CONTEXT_MESSAGE`].
pub fn build_context(results: &[RetrievedResult]) -> String {
    if results.is_empty() {
        return NO_CONTEXT_MESSAGE.to_string();
    }

    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "Document {} (Relevance: {:.2}, Source: {}):\n{}\n",
                i + 1,
                r.similarity,
                r.source().unwrap_or("Unknown"),
                r.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Assemble the full generation prompt. `None` uses [`DEFAULT_SYSTEM_PROMPT`].
pub fn build_prompt(query: &str, context: &str, system_prompt: Option<&str>) -> String {
    let system = system_prompt.unwrap_or(DEFAULT_SYSTEM_PROMPT);
    format!("{system}\n\nContext Information:\n{context}\n\nUser Question: {query}\n\nResponse:")
}

pub fn build_summary_prompt(text: &str, max_words: usize) -> String {
    format!(
        "Please provide a concise summary of the following text in no more than {max_words} words:\n\n{text}\n\nSummary:"
    )
}

/// Cheap heuristics about a generated answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseEvaluation {
    /// Answer length in characters.
    pub length: usize,
    /// Whether any context was retrieved at all.
    pub context_relevance: bool,
    /// Whether any retrieved result named its source file.
    pub has_sources: bool,
}

pub fn evaluate_response(response: &str, results: &[RetrievedResult]) -> ResponseEvaluation {
    ResponseEvaluation {
        length: response.chars().count(),
        context_relevance: !results.is_empty(),
        has_sources: results.iter().any(|r| r.metadata.contains_key("source")),
    }
}
