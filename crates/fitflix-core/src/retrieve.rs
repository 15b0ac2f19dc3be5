//! Query-time retrieval over a [`VectorStore`].
//!
//! The [`Retriever`] embeds a question, asks the store for its nearest
//! records, and returns them as ranked [`RetrievedResult`]s. An empty
//! collection or a failing embedder/store yields an empty result list and
//! a log line; the caller then answers with "no context found".
//!
//! Writes go through [`Retriever::add_documents`], which embeds everything
//! up front and then inserts in batches of [`STORE_BATCH_SIZE`].

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use serde::Serialize;

use crate::embedding::{embed_query, EmbeddingProvider};
use crate::models::{Chunk, Metadata, RetrievedResult, StoredRecord};
use crate::store::{MetadataFilter, VectorStore};

/// Maximum records per store insert call.
pub const STORE_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrieverStatus {
    Ready,
    NotInitialized,
    Error,
}

/// Snapshot of the retriever's collection. Produced without ever failing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalStats {
    pub document_count: usize,
    pub collection_name: Option<String>,
    pub status: RetrieverStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Option<Arc<dyn VectorStore>>,
}

impl Retriever {
    /// A retriever with no store attached yet. Call
    /// [`initialize`](Self::initialize) before reading or writing.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            store: None,
        }
    }

    pub fn with_store(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            embedder,
            store: Some(store),
        }
    }

    pub fn initialize(&mut self, store: Arc<dyn VectorStore>) {
        self.store = Some(store);
    }

    pub fn is_initialized(&self) -> bool {
        self.store.is_some()
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    fn store(&self) -> Result<&Arc<dyn VectorStore>> {
        self.store
            .as_ref()
            .ok_or_else(|| anyhow!("retriever not initialized"))
    }

    /// Embed and store a batch of texts.
    ///
    /// `metadata` must line up with `documents`. When `ids` is `None`, ids
    /// are `doc_0`, `doc_1`, ... in input order. All texts are embedded
    /// before anything is written.
    ///
    /// Returns the number of records written. Ids whose content is already
    /// stored unchanged are skipped by the store.
    pub async fn add_documents(
        &self,
        documents: &[String],
        metadata: &[Metadata],
        ids: Option<&[String]>,
    ) -> Result<usize> {
        let store = self.store()?;

        if documents.len() != metadata.len() {
            bail!(
                "documents and metadata length mismatch: {} vs {}",
                documents.len(),
                metadata.len()
            );
        }
        let ids: Vec<String> = match ids {
            Some(ids) if ids.len() != documents.len() => bail!(
                "documents and ids length mismatch: {} vs {}",
                documents.len(),
                ids.len()
            ),
            Some(ids) => ids.to_vec(),
            None => (0..documents.len()).map(|i| format!("doc_{i}")).collect(),
        };
        if documents.is_empty() {
            return Ok(0);
        }

        let embeddings = self.embedder.embed(documents).await?;
        if embeddings.len() != documents.len() {
            bail!(
                "embedding provider returned {} vectors for {} documents",
                embeddings.len(),
                documents.len()
            );
        }

        let records: Vec<StoredRecord> = ids
            .into_iter()
            .zip(embeddings)
            .zip(documents.iter().zip(metadata))
            .map(|((id, embedding), (content, meta))| StoredRecord {
                id,
                embedding,
                content: content.clone(),
                metadata: meta.clone(),
            })
            .collect();

        let mut inserted = 0;
        for (i, batch) in records.chunks(STORE_BATCH_SIZE).enumerate() {
            inserted += store.insert(batch).await?;
            tracing::debug!("Stored batch {} ({} records)", i + 1, batch.len());
        }

        tracing::info!(
            "Added {} documents to collection {}",
            inserted,
            store.collection()
        );
        Ok(inserted)
    }

    /// Store chunks under ids `{id_prefix}_{i}`.
    pub async fn add_chunks(&self, chunks: &[Chunk], id_prefix: &str) -> Result<usize> {
        let documents: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let metadata: Vec<Metadata> = chunks.iter().map(|c| c.metadata.to_map()).collect();
        let ids: Vec<String> = (0..chunks.len())
            .map(|i| format!("{id_prefix}_{i}"))
            .collect();
        self.add_documents(&documents, &metadata, Some(&ids)).await
    }

    /// Delete records whose id starts with `{id_prefix}_` but is not in
    /// `keep`. Used after re-indexing so chunks of shrunk or removed files
    /// do not linger.
    pub async fn remove_stale(&self, keep: &[String], id_prefix: &str) -> Result<usize> {
        let store = self.store()?;
        let keep: HashSet<&str> = keep.iter().map(String::as_str).collect();
        let prefix = format!("{id_prefix}_");
        let stale: Vec<String> = store
            .ids()
            .await?
            .into_iter()
            .filter(|id| id.starts_with(&prefix) && !keep.contains(id.as_str()))
            .collect();
        if stale.is_empty() {
            return Ok(0);
        }
        let removed = store.delete(&stale).await?;
        tracing::info!("Removed {} stale records from {}", removed, store.collection());
        Ok(removed)
    }

    /// The `n_results` records most similar to `query`, best first.
    ///
    /// Returns at most `min(n_results, stored count)` results. Only an
    /// uninitialized retriever is an error; every other failure is logged
    /// and yields an empty list.
    pub async fn retrieve(
        &self,
        query: &str,
        n_results: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievedResult>> {
        let store = self.store()?;

        let count = match store.count().await {
            Ok(count) => count,
            Err(e) => {
                tracing::error!("Retrieval failed counting collection: {:#}", e);
                return Ok(Vec::new());
            }
        };
        if count == 0 {
            tracing::warn!("No documents in collection {}", store.collection());
            return Ok(Vec::new());
        }
        let n = n_results.min(count);
        if n == 0 {
            return Ok(Vec::new());
        }

        let vector = match embed_query(self.embedder.as_ref(), query).await {
            Ok(v) => v,
            Err(e) => {
                tracing::error!("Retrieval failed embedding query: {:#}", e);
                return Ok(Vec::new());
            }
        };

        let matches = match store.query(&vector, n, filter).await {
            Ok(m) => m,
            Err(e) => {
                tracing::error!("Retrieval failed querying store: {:#}", e);
                return Ok(Vec::new());
            }
        };

        let results: Vec<RetrievedResult> = matches
            .into_iter()
            .enumerate()
            .map(|(i, m)| RetrievedResult {
                id: m.id,
                content: m.content,
                metadata: m.metadata,
                distance: m.distance,
                similarity: 1.0 - m.distance,
                rank: i + 1,
            })
            .collect();

        tracing::info!("Retrieved {} documents for query", results.len());
        Ok(results)
    }

    pub async fn delete_documents(&self, ids: &[String]) -> Result<usize> {
        self.store()?.delete(ids).await
    }

    /// Drop every record in the collection.
    pub async fn reset(&self) -> Result<()> {
        let store = self.store()?;
        store.reset().await?;
        tracing::info!("Reset collection {}", store.collection());
        Ok(())
    }

    pub async fn get_retrieval_stats(&self) -> RetrievalStats {
        let Some(store) = self.store.as_ref() else {
            return RetrievalStats {
                document_count: 0,
                collection_name: None,
                status: RetrieverStatus::NotInitialized,
                error: None,
            };
        };

        match store.count().await {
            Ok(count) => RetrievalStats {
                document_count: count,
                collection_name: Some(store.collection().to_string()),
                status: RetrieverStatus::Ready,
                error: None,
            },
            Err(e) => RetrievalStats {
                document_count: 0,
                collection_name: Some(store.collection().to_string()),
                status: RetrieverStatus::Error,
                error: Some(format!("{:#}", e)),
            },
        }
    }
}
