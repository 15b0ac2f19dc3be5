//! In-memory [`VectorStore`] for tests and throwaway sessions.
//!
//! Records live in a `Vec` behind `std::sync::RwLock`. Queries are
//! brute-force cosine distance over every record.

use std::collections::HashSet;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::StoredRecord;

use super::{nearest, MetadataFilter, QueryMatch, VectorStore, DEFAULT_COLLECTION};

pub struct InMemoryStore {
    collection: String,
    records: RwLock<Vec<StoredRecord>>,
}

impl InMemoryStore {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            records: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_COLLECTION)
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl VectorStore for InMemoryStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn insert(&self, records: &[StoredRecord]) -> Result<usize> {
        let mut stored = self.records.write().map_err(poisoned)?;
        let mut written = 0;
        for record in records {
            match stored.iter().position(|r| r.id == record.id) {
                Some(i) if stored[i].content == record.content => {
                    tracing::debug!("Record {} unchanged", record.id);
                }
                Some(i) => {
                    stored[i] = record.clone();
                    written += 1;
                }
                None => {
                    stored.push(record.clone());
                    written += 1;
                }
            }
        }
        Ok(written)
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryMatch>> {
        let stored = self.records.read().map_err(poisoned)?;
        nearest(vector, k, filter, stored.iter())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().map_err(poisoned)?.len())
    }

    async fn ids(&self) -> Result<Vec<String>> {
        let stored = self.records.read().map_err(poisoned)?;
        Ok(stored.iter().map(|r| r.id.clone()).collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        let doomed: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut stored = self.records.write().map_err(poisoned)?;
        let before = stored.len();
        stored.retain(|r| !doomed.contains(r.id.as_str()));
        Ok(before - stored.len())
    }

    async fn reset(&self) -> Result<()> {
        self.records.write().map_err(poisoned)?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;

    fn record(id: &str, embedding: Vec<f32>) -> StoredRecord {
        StoredRecord {
            id: id.into(),
            embedding,
            content: id.to_uppercase(),
            metadata: Metadata::new(),
        }
    }

    #[tokio::test]
    async fn test_insert_count_query() {
        let store = InMemoryStore::default();
        assert_eq!(store.collection(), "fitflix_documents");
        assert_eq!(store.count().await.unwrap(), 0);

        let n = store
            .insert(&[record("a", vec![1.0, 0.0]), record("b", vec![0.0, 1.0])])
            .await
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(store.count().await.unwrap(), 2);

        let hits = store.query(&[0.1, 1.0], 5, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "b");
        assert_eq!(hits[0].content, "B");
    }

    #[tokio::test]
    async fn test_unchanged_ids_skipped() {
        let store = InMemoryStore::default();
        store.insert(&[record("a", vec![1.0])]).await.unwrap();
        let n = store
            .insert(&[record("a", vec![2.0]), record("c", vec![3.0])])
            .await
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(store.count().await.unwrap(), 2);

        let mut ids = store.ids().await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_changed_content_replaced() {
        let store = InMemoryStore::default();
        store.insert(&[record("a", vec![1.0, 0.0])]).await.unwrap();

        let mut edited = record("a", vec![0.0, 1.0]);
        edited.content = "Yoga moved to 9am".into();
        assert_eq!(store.insert(&[edited]).await.unwrap(), 1);
        assert_eq!(store.count().await.unwrap(), 1);

        let hits = store.query(&[0.0, 1.0], 1, None).await.unwrap();
        assert_eq!(hits[0].content, "Yoga moved to 9am");
        assert!(hits[0].distance.abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_delete_and_reset() {
        let store = InMemoryStore::new("scratch");
        store
            .insert(&[record("a", vec![1.0]), record("b", vec![1.0]), record("c", vec![1.0])])
            .await
            .unwrap();

        let removed = store
            .delete(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count().await.unwrap(), 2);

        store.reset().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.query(&[1.0], 3, None).await.unwrap().is_empty());
    }
}
