//! Vector store abstraction.
//!
//! The [`VectorStore`] trait covers everything the retriever needs from a
//! persistent collection of embedded records: insert, nearest-neighbour
//! query, count, delete, and reset. Implementations must be `Send + Sync`
//! to be shared across async tasks.
//!
//! Re-inserting an existing id is a no-op when the content is unchanged and
//! replaces the stored record when it differs, so re-indexing edited files
//! picks up the new text.

pub mod memory;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;

use crate::embedding::cosine_distance;
use crate::models::{Metadata, StoredRecord};

/// Name of the default collection.
pub const DEFAULT_COLLECTION: &str = "fitflix_documents";

/// A nearest-neighbour hit, before ranking metadata is attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryMatch {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
    /// Cosine distance to the query vector.
    pub distance: f32,
}

/// Equality conditions on record metadata, all of which must hold.
///
/// ```rust
/// use fitflix_core::store::MetadataFilter;
///
/// let filter = MetadataFilter::new().eq("category", "nutrition");
/// assert!(!filter.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    conditions: Vec<(String, serde_json::Value)>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.conditions.push((key.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.conditions
            .iter()
            .all(|(key, value)| metadata.get(key) == Some(value))
    }
}

/// Persistent collection of embedded records.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Collection name this store reads and writes.
    fn collection(&self) -> &str;

    /// Insert records. An existing id is replaced only if its content
    /// changed.
    ///
    /// Returns the number of records written (new or replaced).
    async fn insert(&self, records: &[StoredRecord]) -> Result<usize>;

    /// The `k` records closest to `vector` by cosine distance, nearest first.
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryMatch>>;

    async fn count(&self) -> Result<usize>;

    /// Every id in the collection, in no particular order.
    async fn ids(&self) -> Result<Vec<String>>;

    /// Delete records by id. Returns how many were removed.
    async fn delete(&self, ids: &[String]) -> Result<usize>;

    /// Remove every record in the collection.
    async fn reset(&self) -> Result<()>;
}

/// Brute-force nearest-neighbour ranking shared by the store backends.
///
/// Sorts by ascending cosine distance. Ties keep their input order.
///
/// # Errors
///
/// Fails if any candidate record has a different dimensionality than the
/// query, which means the collection was built with another embedding
/// model. Distances across dimensions are meaningless.
pub fn nearest<'a, I>(
    query: &[f32],
    k: usize,
    filter: Option<&MetadataFilter>,
    records: I,
) -> Result<Vec<QueryMatch>>
where
    I: IntoIterator<Item = &'a StoredRecord>,
{
    let mut matches = Vec::new();
    for r in records {
        if !filter.map_or(true, |f| f.matches(&r.metadata)) {
            continue;
        }
        if r.embedding.len() != query.len() {
            bail!(
                "embedding dimension mismatch: query has {} dims but record {} has {}",
                query.len(),
                r.id,
                r.embedding.len()
            );
        }
        matches.push(QueryMatch {
            id: r.id.clone(),
            content: r.content.clone(),
            metadata: r.metadata.clone(),
            distance: cosine_distance(query, &r.embedding),
        });
    }

    matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    matches.truncate(k);
    Ok(matches)
}
