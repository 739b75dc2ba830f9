//! Error type shared by the indexer and its store adapter.

use std::path::PathBuf;

use thiserror::Error;

use crate::chunker::ChunkerError;
use crate::embeddings::EmbeddingError;
use crate::store::StoreError;

/// Errors that can occur while indexing, searching or maintaining the index.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Corrupt record at {key}: {source}")]
    CorruptRecord {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<ChunkerError> for IndexError {
    fn from(err: ChunkerError) -> Self {
        IndexError::Config(err.to_string())
    }
}

impl IndexError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IndexError::Io {
            path: path.into(),
            source,
        }
    }
}
