//! The `stats` command.
//!
//! Summarizes the vector store and the knowledge base on disk, so it is easy
//! to tell whether indexing has run and what it picked up.

use anyhow::Result;

use fitflix_core::retrieve::RetrieverStatus;

use crate::config::Config;
use crate::knowledge_base::KnowledgeBase;
use crate::loader::{document_stats, load_all_documents};

pub async fn run_stats(config: &Config) -> Result<()> {
    let kb = KnowledgeBase::from_config(config.clone())?;
    let stats = kb.stats().await;

    let db_size = std::fs::metadata(&config.store.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("FIT-FLIX Knowledge Base Stats");
    println!("=============================");
    println!();
    println!("  Store:       {}", config.store.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!(
        "  Collection:  {}",
        stats.collection_name.as_deref().unwrap_or("-")
    );
    println!("  Status:      {}", status_label(stats.status));
    if let Some(err) = &stats.error {
        println!("  Error:       {}", err);
    }
    println!("  Records:     {}", stats.document_count);
    println!("  Embedding:   {}", kb.embedding_model());

    let documents = load_all_documents(&config.knowledge_base)?;
    let doc_stats = document_stats(&documents);

    println!();
    println!("  Knowledge base: {}", config.knowledge_base.dir.display());
    println!("  Documents:   {}", doc_stats.total_documents);
    println!("  Characters:  {}", doc_stats.total_characters);
    println!("  Avg length:  {:.0}", doc_stats.average_document_length);

    if !doc_stats.categories.is_empty() {
        println!();
        println!("  {:<16} {:>6}", "CATEGORY", "DOCS");
        println!("  {}", "-".repeat(23));
        for (category, count) in &doc_stats.categories {
            println!("  {:<16} {:>6}", category, count);
        }
    }

    println!();
    Ok(())
}

fn status_label(status: RetrieverStatus) -> &'static str {
    match status {
        RetrieverStatus::Ready => "ready",
        RetrieverStatus::NotInitialized => "not initialized",
        RetrieverStatus::Error => "error",
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
