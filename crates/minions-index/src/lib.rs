//! Codebase indexing and semantic search for minions.
//!
//! This crate provides:
//! - Line-aligned chunking with overlapping windows
//! - Content hashing for incremental re-indexing
//! - Embedding generation (deterministic mock or OpenAI-compatible API)
//! - Persistence of chunk and file records in a key-value store (memory,
//!   JSON file or Redis)
//! - Brute-force cosine similarity search over every stored chunk

pub mod chunker;
pub mod embeddings;
pub mod error;
pub mod hashing;
pub mod index_store;
pub mod indexer;
pub mod records;
pub mod similarity;
pub mod store;
pub mod traversal;

// Re-exports
pub use chunker::{Chunker, ChunkerError, TextChunk};
pub use embeddings::{EmbeddingError, EmbeddingProvider, MockEmbeddings, OpenAiEmbeddings};
pub use index_store::{IndexStore, CHUNK_PREFIX, INDEX_PREFIX};
pub use error::IndexError;
pub use indexer::{CodebaseIndexer, FileOutcome, FileStatus, IndexReport, IndexerConfig};
pub use records::{EmbeddingChunk, IndexStats, IndexedFile, SearchResult};
pub use similarity::cosine_similarity;
pub use store::{
    JsonFileStore, KeyValueStore, MemoryStore, RedisSettings, RedisStore, StoreError,
};

/// Default embedding dimensions (text-embedding-3-small)
pub const DEFAULT_DIMENSIONS: usize = 1536;

/// Default chunk size in characters
pub const DEFAULT_CHUNK_SIZE: usize = 1500;

/// Default overlap between consecutive chunks, in characters
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Files larger than this are never indexed (1 MiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;
