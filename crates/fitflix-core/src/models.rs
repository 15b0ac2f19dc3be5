//! Core data models for the knowledge-base pipeline.
//!
//! ```text
//! knowledge base file ──load──▶ Document ──split──▶ Chunk ──embed──▶ StoredRecord
//!                                                                        │
//!                                     question ──embed──▶ query ──▶ RetrievedResult
//! ```
//!
//! Every stage keeps the originating file's `source` and `category` in its
//! metadata, so a stored record can always be traced back to its file.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Free-form metadata attached to stored records and query results.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Provenance of a loaded knowledge-base file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// File name, e.g. `classes.md`.
    pub source: String,
    /// Path the file was read from.
    pub file_path: String,
    /// Category inferred from the file name (`classes`, `nutrition`, ...).
    pub category: String,
    /// `markdown` or `text`.
    pub file_type: String,
}

impl DocumentMetadata {
    pub fn to_map(&self) -> Metadata {
        let mut map = Metadata::new();
        map.insert("source".into(), self.source.clone().into());
        map.insert("file_path".into(), self.file_path.clone().into());
        map.insert("category".into(), self.category.clone().into());
        map.insert("file_type".into(), self.file_type.clone().into());
        map
    }
}

/// A cleaned knowledge-base file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

/// Position of a chunk within its parent document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(flatten)]
    pub document: DocumentMetadata,
    /// 0-based position of this chunk in the document.
    pub chunk_id: usize,
    pub total_chunks: usize,
    /// Character length of the parent document's content.
    pub original_length: usize,
}

impl ChunkMetadata {
    pub fn to_map(&self) -> Metadata {
        let mut map = self.document.to_map();
        map.insert("chunk_id".into(), self.chunk_id.into());
        map.insert("total_chunks".into(), self.total_chunks.into());
        map.insert("original_length".into(), self.original_length.into());
        map
    }
}

/// A piece of a [`Document`] small enough to embed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn new(content: String, metadata: ChunkMetadata) -> Self {
        Self { content, metadata }
    }
}

/// One row in a vector store collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub content: String,
    pub metadata: Metadata,
}

/// A ranked match for a query. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedResult {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
    /// Cosine distance, `1 - cosine similarity`.
    pub distance: f32,
    /// `1 - distance`.
    pub similarity: f32,
    /// 1-based position in the result list.
    pub rank: usize,
}

impl RetrievedResult {
    /// The originating file name, if the record carries one.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(|v| v.as_str())
    }

    pub fn category(&self) -> Option<&str> {
        self.metadata.get("category").and_then(|v| v.as_str())
    }
}

/// Hex-encoded SHA-256 of a text. Stores compare it to detect edited chunks.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> DocumentMetadata {
        DocumentMetadata {
            source: "classes.md".into(),
            file_path: "kb/classes.md".into(),
            category: "classes".into(),
            file_type: "markdown".into(),
        }
    }

    #[test]
    fn test_chunk_metadata_keeps_provenance() {
        let cm = ChunkMetadata {
            document: meta(),
            chunk_id: 2,
            total_chunks: 3,
            original_length: 1200,
        };
        let map = cm.to_map();
        assert_eq!(map["source"], "classes.md");
        assert_eq!(map["category"], "classes");
        assert_eq!(map["chunk_id"], 2);
        assert_eq!(map["total_chunks"], 3);
    }

    #[test]
    fn test_chunk_metadata_serializes_flat() {
        let cm = ChunkMetadata {
            document: meta(),
            chunk_id: 0,
            total_chunks: 1,
            original_length: 10,
        };
        let json = serde_json::to_value(&cm).unwrap();
        assert_eq!(json["source"], "classes.md");
        assert_eq!(json["original_length"], 10);
    }

    #[test]
    fn test_content_hash_is_sha256_hex() {
        assert_eq!(
            content_hash("hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_ne!(content_hash("Yoga at 7am"), content_hash("Yoga at 9am"));
    }

    #[test]
    fn test_result_source_accessor() {
        let r = RetrievedResult {
            id: "doc_0".into(),
            content: "x".into(),
            metadata: meta().to_map(),
            distance: 0.25,
            similarity: 0.75,
            rank: 1,
        };
        assert_eq!(r.source(), Some("classes.md"));
        assert_eq!(r.category(), Some("classes"));
    }
}
