//! SQLite-backed [`VectorStore`].
//!
//! Every collection shares one `records` table keyed by
//! `(collection, id)`. Queries load the collection's vectors and rank them
//! with brute-force cosine distance, which is plenty for a knowledge base
//! of a few thousand chunks.
//!
//! Each row carries the SHA-256 of its content. Re-inserting an id with a
//! different hash overwrites the row; an equal hash leaves it untouched.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use fitflix_core::embedding::{blob_to_vec, vec_to_blob};
use fitflix_core::models::{content_hash, Metadata, StoredRecord};
use fitflix_core::store::{nearest, MetadataFilter, QueryMatch, VectorStore};

use crate::config::StoreConfig;
use crate::{db, migrate};

pub struct SqliteStore {
    pool: SqlitePool,
    collection: String,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, collection: impl Into<String>) -> Self {
        Self {
            pool,
            collection: collection.into(),
        }
    }

    /// Connect to the configured database and make sure the schema exists.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        let pool = db::connect(&config.path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool, config.collection.clone()))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn load_records(&self) -> Result<Vec<StoredRecord>> {
        let rows = sqlx::query(
            "SELECT id, content, metadata_json, embedding FROM records WHERE collection = ? ORDER BY created_at, rowid",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("id");
            let metadata_json: String = row.get("metadata_json");
            let metadata: Metadata = serde_json::from_str(&metadata_json).unwrap_or_else(|e| {
                tracing::warn!("Invalid metadata for record {}: {}", id, e);
                Metadata::new()
            });
            let blob: Vec<u8> = row.get("embedding");
            records.push(StoredRecord {
                id,
                content: row.get("content"),
                metadata,
                embedding: blob_to_vec(&blob),
            });
        }
        Ok(records)
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn insert(&self, records: &[StoredRecord]) -> Result<usize> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for record in records {
            let metadata_json = serde_json::to_string(&record.metadata)?;
            let result = sqlx::query(
                r#"
                INSERT INTO records (collection, id, content, metadata_json, embedding,
                                     dims, content_hash, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    content = excluded.content,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding,
                    dims = excluded.dims,
                    content_hash = excluded.content_hash,
                    created_at = excluded.created_at
                WHERE records.content_hash != excluded.content_hash
                "#,
            )
            .bind(&self.collection)
            .bind(&record.id)
            .bind(&record.content)
            .bind(&metadata_json)
            .bind(vec_to_blob(&record.embedding))
            .bind(record.embedding.len() as i64)
            .bind(content_hash(&record.content))
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                tracing::debug!("Record {} unchanged", record.id);
            } else {
                written += 1;
            }
        }

        tx.commit().await?;
        Ok(written)
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryMatch>> {
        let records = self.load_records().await?;
        nearest(vector, k, filter, records.iter()).with_context(|| {
            format!(
                "collection {} was indexed with a different embedding model; run `fitflix index --reset`",
                self.collection
            )
        })
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn ids(&self) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM records WHERE collection = ?")
            .bind(&self.collection)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for id in ids {
            let result = sqlx::query("DELETE FROM records WHERE collection = ? AND id = ?")
                .bind(&self.collection)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            removed += result.rows_affected() as usize;
        }
        tx.commit().await?;
        Ok(removed)
    }

    async fn reset(&self) -> Result<()> {
        sqlx::query("DELETE FROM records WHERE collection = ?")
            .bind(&self.collection)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
