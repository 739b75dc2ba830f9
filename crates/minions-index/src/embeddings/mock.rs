//! Deterministic embeddings for tests and offline use.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use super::{EmbeddingError, EmbeddingProvider};

/// Embedding provider that never touches the network.
///
/// Each text seeds a PRNG with the first eight bytes of its SHA-256 digest
/// and draws a unit-length vector from it, so the same text always maps to
/// the bit-identical vector and different texts map to unrelated ones.
#[derive(Debug, Clone)]
pub struct MockEmbeddings {
    dimensions: usize,
}

impl MockEmbeddings {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let digest = Sha256::digest(text.as_bytes());
        let mut seed = [0u8; 8];
        seed.copy_from_slice(&digest[..8]);
        let mut rng = StdRng::seed_from_u64(u64::from_be_bytes(seed));

        let mut vector: Vec<f32> = (0..self.dimensions)
            .map(|_| rng.gen_range(-1.0f32..1.0f32))
            .collect();

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

impl Default for MockEmbeddings {
    fn default() -> Self {
        Self::new(crate::DEFAULT_DIMENSIONS)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.vector_for(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_embed_returns_correct_dimension() {
        let provider = MockEmbeddings::new(512);
        let embedding = provider.embed("test text").await.unwrap();
        assert_eq!(embedding.len(), 512);
    }

    #[tokio::test]
    async fn test_embed_is_unit_length() {
        let provider = MockEmbeddings::new(64);
        let embedding = provider.embed("normalize me").await.unwrap();
        let norm = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_embed_batch_matches_single() {
        let provider = MockEmbeddings::new(32);
        let texts = vec!["text1".to_string(), "text2".to_string(), "text3".to_string()];
        let batch = provider.embed_batch(&texts).await.unwrap();

        assert_eq!(batch.len(), 3);
        for (text, vector) in texts.iter().zip(batch.iter()) {
            assert_eq!(vector, &provider.embed(text).await.unwrap());
        }
    }

    #[test]
    fn test_default_dimension() {
        let provider = MockEmbeddings::default();
        assert_eq!(provider.dimensions(), crate::DEFAULT_DIMENSIONS);
        assert_eq!(provider.model_name(), "mock");
    }

    proptest! {
        #[test]
        fn prop_same_text_same_vector(text in ".{0,200}") {
            let provider = MockEmbeddings::new(16);
            let a = tokio_test::block_on(provider.embed(&text)).unwrap();
            let b = tokio_test::block_on(provider.embed(&text)).unwrap();
            prop_assert_eq!(a, b);
        }

        #[test]
        fn prop_different_text_different_vector(a in ".{0,100}", b in ".{0,100}") {
            prop_assume!(a != b);
            let provider = MockEmbeddings::new(16);
            let va = tokio_test::block_on(provider.embed(&a)).unwrap();
            let vb = tokio_test::block_on(provider.embed(&b)).unwrap();
            prop_assert_ne!(va, vb);
        }
    }
}
