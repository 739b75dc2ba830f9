//! Records persisted by the indexer and values returned to callers.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of an indexed file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedFile {
    /// Path relative to the workspace root, `/`-separated
    pub file_path: String,

    /// SHA256 hash of the file content
    pub content_hash: String,

    /// IDs of the chunks currently stored for this file
    #[serde(default)]
    pub chunk_ids: Vec<String>,

    /// When the file was last indexed
    pub indexed_at: DateTime<Utc>,
}

impl IndexedFile {
    pub fn new(file_path: String, content_hash: String, chunk_ids: Vec<String>) -> Self {
        Self {
            file_path,
            content_hash,
            chunk_ids,
            indexed_at: Utc::now(),
        }
    }
}

/// A stored chunk of a file together with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingChunk {
    pub chunk_id: String,
    pub file_path: String,
    pub content: String,
    pub embedding: Vec<f32>,
    /// Start line (1-indexed)
    pub line_start: usize,
    /// End line (1-indexed, inclusive)
    pub line_end: usize,
}

/// A search hit. Produced per query, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub file_path: String,
    pub content: String,
    /// Cosine similarity to the query, in [-1, 1]
    pub score: f32,
    pub line_start: usize,
    pub line_end: usize,
}

/// Counts taken from the store at the time of the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub indexed_files: usize,
    pub total_chunks: usize,
    pub workspace_path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexed_file_json_shape() {
        let file = IndexedFile::new(
            "src/main.rs".to_string(),
            "abc123".to_string(),
            vec!["c1".to_string(), "c2".to_string()],
        );
        let value = serde_json::to_value(&file).unwrap();

        assert_eq!(value["file_path"], "src/main.rs");
        assert_eq!(value["content_hash"], "abc123");
        assert_eq!(value["chunk_ids"][1], "c2");
        assert!(value["indexed_at"].is_string());

        let back: IndexedFile = serde_json::from_value(value).unwrap();
        assert_eq!(back, file);
    }

    #[test]
    fn test_indexed_file_missing_chunk_ids_defaults_empty() {
        let value = serde_json::json!({
            "file_path": "a.py",
            "content_hash": "h",
            "indexed_at": "2024-01-01T00:00:00Z"
        });
        let file: IndexedFile = serde_json::from_value(value).unwrap();
        assert!(file.chunk_ids.is_empty());
    }
}
