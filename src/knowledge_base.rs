//! The indexed knowledge base.
//!
//! [`KnowledgeBase`] owns the path from files on disk to searchable
//! records: load → validate → split → embed → store. The SQLite store is
//! opened lazily on first use and shared by every later call.
//!
//! Chunk ids are `chunk_{i}` in load order. Re-indexing rewrites only the
//! ids whose content changed and deletes ids past the new chunk count, so
//! indexing unchanged files twice writes nothing. `reset = true` clears the
//! collection first, which is required after switching embedding models.

use std::sync::Arc;

use anyhow::{bail, Result};
use serde::Serialize;
use tokio::sync::{Mutex, OnceCell};

use fitflix_core::chunk::TextSplitter;
use fitflix_core::embedding::EmbeddingProvider;
use fitflix_core::models::RetrievedResult;
use fitflix_core::retrieve::{RetrievalStats, Retriever, RetrieverStatus};
use fitflix_core::store::MetadataFilter;

use crate::config::Config;
use crate::embedding::create_provider;
use crate::loader::{load_all_documents, validate_documents};
use crate::sqlite_store::SqliteStore;

/// Prefix for ids of indexed chunks.
pub const CHUNK_ID_PREFIX: &str = "chunk";

/// Outcome of one indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub documents: usize,
    pub chunks: usize,
    /// Records written: new ids plus ids whose content changed.
    pub inserted: usize,
    /// Stale chunk records deleted.
    pub removed: usize,
    /// Records in the collection afterwards.
    pub total: usize,
}

pub struct KnowledgeBase {
    config: Config,
    embedder: Arc<dyn EmbeddingProvider>,
    splitter: TextSplitter,
    retriever: OnceCell<Retriever>,
    bootstrapped: Mutex<bool>,
}

impl KnowledgeBase {
    pub fn new(config: Config, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        let splitter = TextSplitter::new(config.chunking.chunk_size, config.chunking.chunk_overlap);
        Self {
            config,
            embedder,
            splitter,
            retriever: OnceCell::new(),
            bootstrapped: Mutex::new(false),
        }
    }

    /// Build with the embedding provider named in the config.
    pub fn from_config(config: Config) -> Result<Self> {
        let embedder = create_provider(&config.embedding)?;
        Ok(Self::new(config, embedder))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The retriever over the opened store. Does not index anything.
    pub async fn open(&self) -> Result<&Retriever> {
        self.retriever
            .get_or_try_init(|| async {
                let store = SqliteStore::open(&self.config.store).await?;
                tracing::info!(
                    "Opened collection {} at {}",
                    self.config.store.collection,
                    self.config.store.path.display()
                );
                Ok::<_, anyhow::Error>(Retriever::with_store(
                    self.embedder.clone(),
                    Arc::new(store),
                ))
            })
            .await
    }

    /// Open the store and, if the collection is empty, index the knowledge
    /// base. Later calls are no-ops.
    pub async fn ensure_initialized(&self) -> Result<&Retriever> {
        let retriever = self.open().await?;

        let mut bootstrapped = self.bootstrapped.lock().await;
        if !*bootstrapped {
            let stats = retriever.get_retrieval_stats().await;
            if let Some(err) = stats.error {
                bail!("Vector store unavailable: {}", err);
            }
            if stats.document_count == 0 {
                tracing::info!("Collection is empty, indexing knowledge base");
                self.build_index(retriever).await?;
            } else {
                tracing::info!("Using existing index with {} records", stats.document_count);
            }
            *bootstrapped = true;
        }

        Ok(retriever)
    }

    /// Index the knowledge base, optionally clearing the collection first.
    pub async fn index(&self, reset: bool) -> Result<IndexReport> {
        let retriever = self.open().await?;
        let mut bootstrapped = self.bootstrapped.lock().await;

        if reset {
            retriever.reset().await?;
        }
        let report = self.build_index(retriever).await?;
        *bootstrapped = true;
        Ok(report)
    }

    /// Nearest chunks for `query`, optionally restricted to one category.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        category: Option<&str>,
    ) -> Result<Vec<RetrievedResult>> {
        let retriever = self.ensure_initialized().await?;
        let filter = category.map(|c| MetadataFilter::new().eq("category", c));
        retriever.retrieve(query, top_k, filter.as_ref()).await
    }

    /// Collection statistics. Opening failures are reported in the result.
    pub async fn stats(&self) -> RetrievalStats {
        match self.open().await {
            Ok(retriever) => retriever.get_retrieval_stats().await,
            Err(e) => RetrievalStats {
                document_count: 0,
                collection_name: Some(self.config.store.collection.clone()),
                status: RetrieverStatus::Error,
                error: Some(format!("{:#}", e)),
            },
        }
    }

    pub fn embedding_model(&self) -> &str {
        self.embedder.model_name()
    }

    async fn build_index(&self, retriever: &Retriever) -> Result<IndexReport> {
        let kb = &self.config.knowledge_base;
        if !kb.dir.is_dir() {
            bail!("Knowledge base directory not found: {}", kb.dir.display());
        }

        let documents = validate_documents(load_all_documents(kb)?);
        if documents.is_empty() {
            bail!("No documents loaded from {}", kb.dir.display());
        }

        let chunks = self.splitter.split_documents(&documents);
        if chunks.is_empty() {
            bail!("No chunks produced from {}", kb.dir.display());
        }

        let inserted = retriever.add_chunks(&chunks, CHUNK_ID_PREFIX).await?;
        let keep: Vec<String> = (0..chunks.len())
            .map(|i| format!("{CHUNK_ID_PREFIX}_{i}"))
            .collect();
        let removed = retriever.remove_stale(&keep, CHUNK_ID_PREFIX).await?;
        let total = retriever.get_retrieval_stats().await.document_count;
        tracing::info!(
            "Indexed {} documents as {} chunks ({} written, {} removed, {} total)",
            documents.len(),
            chunks.len(),
            inserted,
            removed,
            total
        );

        Ok(IndexReport {
            documents: documents.len(),
            chunks: chunks.len(),
            inserted,
            removed,
            total,
        })
    }
}
