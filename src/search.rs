//! The `retrieve` command: show the chunks a question would be answered from.

use anyhow::{bail, Result};

use fitflix_core::models::RetrievedResult;

use crate::config::Config;
use crate::knowledge_base::KnowledgeBase;

/// Longest excerpt printed per result, in characters.
const EXCERPT_CHARS: usize = 240;

pub async fn run_retrieve(
    config: &Config,
    query: &str,
    top_k: Option<usize>,
    category: Option<&str>,
) -> Result<()> {
    if query.trim().is_empty() {
        bail!("Query must not be empty");
    }
    let top_k = top_k.unwrap_or(config.retrieval.top_k);
    if top_k == 0 {
        bail!("--top-k must be >= 1");
    }

    let kb = KnowledgeBase::from_config(config.clone())?;
    let results = kb.retrieve(query, top_k, category).await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for result in &results {
        print_result(result);
    }
    Ok(())
}

fn print_result(result: &RetrievedResult) {
    println!(
        "{}. [{:.2}] {} / {}",
        result.rank,
        result.similarity,
        result.source().unwrap_or("Unknown"),
        result.category().unwrap_or("general")
    );
    println!("    excerpt: \"{}\"", excerpt(&result.content, EXCERPT_CHARS));
    println!("    id: {}", result.id);
    println!();
}

/// First `max_chars` characters on one line, with an ellipsis when cut.
fn excerpt(content: &str, max_chars: usize) -> String {
    let flat = content.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() <= max_chars {
        return flat.to_string();
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_flattens_and_truncates() {
        assert_eq!(excerpt("  Yoga\nat 7am  ", 50), "Yoga at 7am");
        assert_eq!(excerpt("abcdef", 3), "abc...");
        assert_eq!(excerpt("héllo wörld", 5), "héllo...");
    }
}
