//! Configuration for package builds and exemplar retrieval.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RolePackError, Result};

/// Parameters for building a role package's vector index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuildConfig {
    /// Maximum number of embedding calls in flight during an index build.
    pub embed_concurrency: usize,
    /// Per-call limit for embedding capability calls, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability_timeout_ms: Option<u64>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self { embed_concurrency: 4, capability_timeout_ms: None }
    }
}

impl BuildConfig {
    /// Create a new builder for constructing a [`BuildConfig`].
    pub fn builder() -> BuildConfigBuilder {
        BuildConfigBuilder::default()
    }

    /// The per-call capability timeout, if one is configured.
    pub fn capability_timeout(&self) -> Option<Duration> {
        self.capability_timeout_ms.map(Duration::from_millis)
    }

    /// Check that the parameters are usable.
    ///
    /// # Errors
    ///
    /// Returns [`RolePackError::ConfigError`] if `embed_concurrency == 0` or
    /// the capability timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.embed_concurrency == 0 {
            return Err(RolePackError::ConfigError(
                "embed_concurrency must be greater than zero".to_string(),
            ));
        }
        validate_timeout(self.capability_timeout_ms)
    }
}

/// Builder for constructing a validated [`BuildConfig`].
#[derive(Debug, Clone, Default)]
pub struct BuildConfigBuilder {
    config: BuildConfig,
}

impl BuildConfigBuilder {
    /// Set the maximum number of concurrent embedding calls.
    pub fn embed_concurrency(mut self, concurrency: usize) -> Self {
        self.config.embed_concurrency = concurrency;
        self
    }

    /// Bound every embedding call by `timeout`.
    pub fn capability_timeout(mut self, timeout: Duration) -> Self {
        self.config.capability_timeout_ms = Some(timeout_millis(timeout));
        self
    }

    /// Build the [`BuildConfig`], validating its parameters.
    pub fn build(self) -> Result<BuildConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Parameters for the two-stage recall/rerank search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of nearest neighbours selected by the distance scan.
    pub recall_k: usize,
    /// Maximum number of exemplars kept after reranking.
    pub rerank_k: usize,
    /// Index size at which the distance scan is spread across threads.
    pub parallel_scan_threshold: usize,
    /// Per-call limit for embedding and rerank capability calls, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability_timeout_ms: Option<u64>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            recall_k: 10,
            rerank_k: 10,
            parallel_scan_threshold: 4096,
            capability_timeout_ms: None,
        }
    }
}

impl RetrievalConfig {
    /// Create a new builder for constructing a [`RetrievalConfig`].
    pub fn builder() -> RetrievalConfigBuilder {
        RetrievalConfigBuilder::default()
    }

    /// The per-call capability timeout, if one is configured.
    pub fn capability_timeout(&self) -> Option<Duration> {
        self.capability_timeout_ms.map(Duration::from_millis)
    }

    /// Check that the parameters are usable.
    ///
    /// `recall_k` and `rerank_k` may be zero; such searches return nothing.
    ///
    /// # Errors
    ///
    /// Returns [`RolePackError::ConfigError`] if `parallel_scan_threshold == 0`
    /// or the capability timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.parallel_scan_threshold == 0 {
            return Err(RolePackError::ConfigError(
                "parallel_scan_threshold must be greater than zero".to_string(),
            ));
        }
        validate_timeout(self.capability_timeout_ms)
    }
}

/// Builder for constructing a validated [`RetrievalConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetrievalConfigBuilder {
    config: RetrievalConfig,
}

impl RetrievalConfigBuilder {
    /// Set the number of candidates recalled by vector distance.
    pub fn recall_k(mut self, k: usize) -> Self {
        self.config.recall_k = k;
        self
    }

    /// Set the number of exemplars kept after reranking.
    pub fn rerank_k(mut self, k: usize) -> Self {
        self.config.rerank_k = k;
        self
    }

    /// Set the index size at which the distance scan runs in parallel.
    pub fn parallel_scan_threshold(mut self, threshold: usize) -> Self {
        self.config.parallel_scan_threshold = threshold;
        self
    }

    /// Bound every capability call by `timeout`.
    pub fn capability_timeout(mut self, timeout: Duration) -> Self {
        self.config.capability_timeout_ms = Some(timeout_millis(timeout));
        self
    }

    /// Build the [`RetrievalConfig`], validating its parameters.
    pub fn build(self) -> Result<RetrievalConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Whole milliseconds, rounding sub-millisecond remainders up and saturating.
fn timeout_millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
}

fn validate_timeout(timeout_ms: Option<u64>) -> Result<()> {
    if timeout_ms == Some(0) {
        return Err(RolePackError::ConfigError(
            "capability_timeout_ms must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// Combined configuration, typically read from a `rolepack.yaml` file.
///
/// ```yaml
/// build:
///   embed_concurrency: 8
/// retrieval:
///   recall_k: 10
///   rerank_k: 3
///   capability_timeout_ms: 5000
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RolePackConfig {
    /// Index build settings.
    pub build: BuildConfig,
    /// Search settings.
    pub retrieval: RetrievalConfig,
}

impl RolePackConfig {
    /// Parse and validate a YAML document. Missing fields take their defaults.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| RolePackError::ConfigError(format!("invalid YAML config: {e}")))?;
        config.build.validate()?;
        config.retrieval.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML config file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RolePackError::ConfigError(format!("failed to read config '{}': {e}", path.display()))
        })?;
        Self::from_yaml_str(&content)
    }
}
