//! Embeds a corpus into an [`ExemplarStore`].

use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};
use tracing::{error, info};

use crate::config::BuildConfig;
use crate::corpus::CorpusStore;
use crate::deadline::{bounded, embedding_failure};
use crate::embedding::EmbeddingProvider;
use crate::error::{RolePackError, Result};
use crate::index::{ExemplarStore, VectorIndex};

/// Builds the vector index for a corpus, one embedding per record question.
///
/// Records are embedded concurrently (up to
/// [`BuildConfig::embed_concurrency`] calls in flight), but each vector is
/// written to its record's own slot, so the index order always matches the
/// corpus order. A build is all-or-nothing: the first failing record aborts
/// it and no index is returned.
///
/// # Example
///
/// ```rust,ignore
/// use rolepack::{CorpusStore, VectorIndexBuilder};
///
/// let corpus = CorpusStore::from_path("dataset.json")?;
/// let store = VectorIndexBuilder::new(embedder).build(corpus).await?;
/// assert_eq!(store.corpus().len(), store.index().len());
/// ```
pub struct VectorIndexBuilder {
    embedding_provider: Arc<dyn EmbeddingProvider>,
    config: BuildConfig,
}

impl VectorIndexBuilder {
    /// Create a builder with the default [`BuildConfig`].
    pub fn new(embedding_provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embedding_provider, config: BuildConfig::default() }
    }

    /// Replace the build configuration.
    pub fn with_config(mut self, config: BuildConfig) -> Self {
        self.config = config;
        self
    }

    /// Return a reference to the build configuration.
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Embed every record of `corpus` and pair the result with it.
    ///
    /// # Errors
    ///
    /// - [`RolePackError::ConfigError`] if the configuration is invalid or the
    ///   provider reports zero dimensions.
    /// - [`RolePackError::EmbeddingError`] if any embedding call fails or times out.
    /// - [`RolePackError::DimensionMismatch`] if any vector is not as wide as
    ///   the provider's reported dimensions.
    pub async fn build(&self, corpus: CorpusStore) -> Result<ExemplarStore> {
        self.config.validate()?;
        let provider = self.embedding_provider.as_ref();
        let provider_name = provider.name().to_string();
        let dimensions = provider.dimensions();
        let timeout = self.config.capability_timeout();
        let mut index = VectorIndex::with_capacity(dimensions, corpus.len())?;

        let mut slots: Vec<Option<Vec<f32>>> = vec![None; corpus.len()];

        stream::iter(corpus.iter().enumerate())
            .map(|(position, record)| {
                let provider_name = provider_name.as_str();
                async move {
                    let vector = bounded(timeout, provider.embed(&record.question), |limit| {
                        RolePackError::EmbeddingError {
                            provider: provider_name.to_string(),
                            message: format!("record {position} timed out after {limit:?}"),
                        }
                    })
                    .await
                    .map_err(|e| embedding_failure(provider_name, e))?;

                    if vector.len() != dimensions {
                        return Err(RolePackError::DimensionMismatch {
                            expected: dimensions,
                            actual: vector.len(),
                        });
                    }
                    Ok((position, vector))
                }
            })
            .buffer_unordered(self.config.embed_concurrency)
            .try_for_each(|(position, vector)| {
                slots[position] = Some(vector);
                futures::future::ready(Ok(()))
            })
            .await
            .map_err(|e| {
                error!(provider = %provider_name, error = %e, "index build aborted");
                e
            })?;

        for (position, slot) in slots.into_iter().enumerate() {
            let vector = slot.ok_or_else(|| {
                RolePackError::EmbeddingError {
                    provider: provider_name.clone(),
                    message: format!("no embedding produced for record {position}"),
                }
            })?;
            index.push(&vector)?;
        }

        info!(provider = %provider_name, records = index.len(), dimensions, "built vector index");
        ExemplarStore::from_parts(corpus, index)
    }
}
