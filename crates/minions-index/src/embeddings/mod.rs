//! Embedding provider trait and implementations.
//!
//! This module defines the interface for generating embeddings
//! and provides two implementations:
//! - [`MockEmbeddings`]: deterministic, offline vectors derived from a hash of the text
//! - [`OpenAiEmbeddings`]: an OpenAI-compatible `/embeddings` HTTP API

mod mock;
mod openai;

pub use mock::MockEmbeddings;
pub use openai::OpenAiEmbeddings;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during embedding generation.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Expected {expected}-dimensional embedding, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid embedding configuration: {0}")]
    InvalidConfig(String),
}

/// Trait for embedding providers.
///
/// Implementations should be Send + Sync to allow use in async contexts.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed multiple texts in a batch.
    ///
    /// The result has one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Get the number of dimensions
    fn dimensions(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}
