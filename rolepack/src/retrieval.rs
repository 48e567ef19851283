//! Two-stage exemplar retrieval: exact vector recall, then rerank.
//!
//! The [`RetrievalEngine`] embeds the query, scans every vector of an
//! [`ExemplarStore`] for the `recall_k` nearest (squared Euclidean distance,
//! ties to the lower position), scores the recalled questions against the
//! query with a [`Reranker`], and keeps the `rerank_k` best. Equal rerank
//! scores keep their recall order.
//!
//! # Example
//!
//! ```rust,ignore
//! use rolepack::{RetrievalConfig, RetrievalEngine, RolePackageLoader};
//!
//! let package = RolePackageLoader::load("output/爱莉.zip")?;
//! let engine = RetrievalEngine::builder()
//!     .config(RetrievalConfig::builder().recall_k(10).rerank_k(3).build()?)
//!     .embedding_provider(Arc::new(embedder))
//!     .reranker(Arc::new(reranker))
//!     .build()?;
//!
//! let result = engine.search(package.store(), "医生我最近头疼").await?;
//! ```

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::RetrievalConfig;
use crate::deadline::{bounded, embedding_failure, rerank_failure};
use crate::embedding::EmbeddingProvider;
use crate::error::{RolePackError, Result};
use crate::index::{ExemplarStore, Neighbor};
use crate::record::{RetrievalResult, ScoredExemplar};
use crate::reranker::Reranker;

/// Answers queries against loaded exemplar stores.
///
/// The engine holds no per-package state, so one engine can serve any number
/// of stores, and concurrent searches against the same store need no locking.
pub struct RetrievalEngine {
    config: RetrievalConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    reranker: Arc<dyn Reranker>,
}

impl RetrievalEngine {
    /// Create a new [`RetrievalEngineBuilder`].
    pub fn builder() -> RetrievalEngineBuilder {
        RetrievalEngineBuilder::default()
    }

    /// Return a reference to the engine configuration.
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Search with the configured `recall_k` and `rerank_k`.
    pub async fn search(&self, store: &ExemplarStore, query: &str) -> Result<RetrievalResult> {
        self.search_with(store, query, self.config.recall_k, self.config.rerank_k).await
    }

    /// Search with explicit candidate counts.
    ///
    /// Returns `min(rerank_k, recall_k, store.len())` exemplars ordered by
    /// descending rerank score. `rerank_k` larger than the recalled pool is
    /// clamped, never widening the pool. When that minimum is zero neither
    /// capability is called.
    ///
    /// # Errors
    ///
    /// - [`RolePackError::EmbeddingError`] if the query cannot be embedded.
    /// - [`RolePackError::DimensionMismatch`] if the query vector's width
    ///   differs from the store's.
    /// - [`RolePackError::RerankerError`] if scoring fails, times out, or
    ///   returns the wrong number of scores.
    pub async fn search_with(
        &self,
        store: &ExemplarStore,
        query: &str,
        recall_k: usize,
        rerank_k: usize,
    ) -> Result<RetrievalResult> {
        if recall_k.min(rerank_k).min(store.len()) == 0 {
            debug!(recall_k, rerank_k, records = store.len(), "nothing to retrieve");
            return Ok(RetrievalResult::empty());
        }
        if rerank_k > recall_k {
            warn!(recall_k, rerank_k, "rerank_k exceeds recall_k, clamping");
        }
        let timeout = self.config.capability_timeout();

        // 1. Embed the query
        let provider = self.embedding_provider.name();
        let query_vector = bounded(timeout, self.embedding_provider.embed(query), |limit| {
            RolePackError::EmbeddingError {
                provider: provider.to_string(),
                message: format!("query embedding timed out after {limit:?}"),
            }
        })
        .await
        .map_err(|e| {
            let e = embedding_failure(provider, e);
            error!(error = %e, "embedding failed during query");
            e
        })?;

        // 2. Exact nearest-neighbour recall
        let neighbors =
            store.index().nearest(&query_vector, recall_k, self.config.parallel_scan_threshold)?;
        debug!(
            recalled = neighbors.len(),
            positions = ?neighbors.iter().map(|n| n.position).collect::<Vec<_>>(),
            "recall completed"
        );

        // 3. Dereference positions into records
        let candidates = dereference(store, &neighbors)?;

        // 4. Score each recalled question against the query
        let reranker = self.reranker.name();
        let questions: Vec<&str> = candidates.iter().map(|c| c.record.question.as_str()).collect();
        let scores = bounded(timeout, self.reranker.score_batch(query, &questions), |limit| {
            RolePackError::RerankerError {
                reranker: reranker.to_string(),
                message: format!("scoring timed out after {limit:?}"),
            }
        })
        .await
        .map_err(|e| {
            let e = rerank_failure(reranker, e);
            error!(error = %e, "reranking failed");
            e
        })?;
        if scores.len() != candidates.len() {
            let e = RolePackError::RerankerError {
                reranker: reranker.to_string(),
                message: format!(
                    "returned {} scores for {} candidates",
                    scores.len(),
                    candidates.len()
                ),
            };
            error!(error = %e, "reranking failed");
            return Err(e);
        }

        // 5. Order by descending score, stable over recall order, then truncate
        let mut ranked: Vec<ScoredExemplar> = candidates
            .into_iter()
            .zip(scores)
            .map(|(candidate, score)| ScoredExemplar { score, ..candidate })
            .collect();
        ranked.sort_by(|a, b| compare_scores(b.score, a.score));
        ranked.truncate(rerank_k);

        info!(result_count = ranked.len(), "query completed");
        Ok(RetrievalResult::new(ranked))
    }
}

fn dereference(store: &ExemplarStore, neighbors: &[Neighbor]) -> Result<Vec<ScoredExemplar>> {
    neighbors
        .iter()
        .map(|neighbor| {
            let record = store.corpus().get(neighbor.position).ok_or_else(|| {
                RolePackError::CorpusIndexSizeMismatch {
                    corpus_len: store.corpus().len(),
                    index_len: store.index().len(),
                }
            })?;
            Ok(ScoredExemplar {
                record: record.clone(),
                score: 0.0,
                position: neighbor.position,
                distance: neighbor.distance,
            })
        })
        .collect()
}

// NaN scores rank below every real score.
fn compare_scores(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Builder for constructing a [`RetrievalEngine`].
///
/// The embedding provider and reranker are required; the configuration
/// defaults to [`RetrievalConfig::default()`].
#[derive(Default)]
pub struct RetrievalEngineBuilder {
    config: Option<RetrievalConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    reranker: Option<Arc<dyn Reranker>>,
}

impl RetrievalEngineBuilder {
    /// Set the retrieval configuration.
    pub fn config(mut self, config: RetrievalConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider used for queries.
    ///
    /// It must be the same model the package was built with.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the reranker.
    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Build the [`RetrievalEngine`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RolePackError::ConfigError`] if a required field is missing
    /// or the configuration is invalid.
    pub fn build(self) -> Result<RetrievalEngine> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedding_provider = self.embedding_provider.ok_or_else(|| {
            RolePackError::ConfigError("embedding_provider is required".to_string())
        })?;
        let reranker = self
            .reranker
            .ok_or_else(|| RolePackError::ConfigError("reranker is required".to_string()))?;

        Ok(RetrievalEngine { config, embedding_provider, reranker })
    }
}
