//! The `index` command.
//!
//! Loads the knowledge base, splits it into chunks, embeds them, and writes
//! them to the vector store. Without `--reset` only chunks whose content
//! changed are rewritten, so re-running on unchanged files is a no-op.

use anyhow::Result;

use crate::config::Config;
use crate::knowledge_base::KnowledgeBase;

pub async fn run_index(config: &Config, reset: bool) -> Result<()> {
    let kb = KnowledgeBase::from_config(config.clone())?;
    let report = kb.index(reset).await?;

    if reset {
        println!("index {} (reset)", config.knowledge_base.dir.display());
    } else {
        println!("index {}", config.knowledge_base.dir.display());
    }
    println!("  documents: {}", report.documents);
    println!("  chunks: {}", report.chunks);
    println!("  inserted: {}", report.inserted);
    println!("  removed: {}", report.removed);
    println!("  total records: {}", report.total);
    println!("  embedding model: {}", kb.embedding_model());
    println!("ok");
    Ok(())
}
