//! Rerank capability trait for scoring query/candidate pairs.

use async_trait::async_trait;

use crate::error::Result;

/// A pairwise relevance scorer, typically a cross-encoder model.
///
/// Scores have no fixed range; higher means more relevant. The default
/// [`score_batch`](Reranker::score_batch) calls [`score`](Reranker::score)
/// once per candidate; backends that score pairs in one forward pass should
/// override it. A batch must return exactly one score per candidate, in
/// candidate order.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Score one candidate text against the query.
    async fn score(&self, query: &str, candidate: &str) -> Result<f32>;

    /// Score every candidate text against the query.
    async fn score_batch(&self, query: &str, candidates: &[&str]) -> Result<Vec<f32>> {
        let mut scores = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            scores.push(self.score(query, candidate).await?);
        }
        Ok(scores)
    }

    /// A short name used in errors and logs.
    fn name(&self) -> &str {
        "reranker"
    }
}

/// A reranker that scores every candidate `0.0`.
///
/// Because the rerank sort is stable, results keep their recall (distance)
/// order. Useful when no rerank model is deployed.
///
/// # Example
///
/// ```rust,ignore
/// use rolepack::NoOpReranker;
///
/// let engine = RetrievalEngine::builder()
///     .embedding_provider(embedder)
///     .reranker(Arc::new(NoOpReranker))
///     .build()?;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReranker;

#[async_trait]
impl Reranker for NoOpReranker {
    async fn score(&self, _query: &str, _candidate: &str) -> Result<f32> {
        Ok(0.0)
    }

    async fn score_batch(&self, _query: &str, candidates: &[&str]) -> Result<Vec<f32>> {
        Ok(vec![0.0; candidates.len()])
    }

    fn name(&self) -> &str {
        "noop"
    }
}
