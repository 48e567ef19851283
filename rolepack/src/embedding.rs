//! Embedding capability trait for turning text into vectors.

use async_trait::async_trait;

use crate::error::Result;

/// A capability that maps text to a fixed-width embedding vector.
///
/// Implementations wrap a concrete embedding model (a local BGE model, a
/// hosted API, etc.). They must be deterministic for identical input for as
/// long as a package built with them is in use, since the query and the
/// corpus are compared in the same vector space.
///
/// The default [`embed_batch`](EmbeddingProvider::embed_batch) implementation
/// calls [`embed`](EmbeddingProvider::embed) sequentially; backends that
/// support native batching should override it.
///
/// # Example
///
/// ```rust,ignore
/// use rolepack::EmbeddingProvider;
///
/// let provider = MyEmbeddingProvider::new();
/// let embedding = provider.embed("你好").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// A short name used in errors and logs.
    fn name(&self) -> &str {
        "embedding"
    }
}
