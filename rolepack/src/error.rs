//! Error types for the `rolepack` crate.

use std::path::PathBuf;

use thiserror::Error;

use crate::package::PackageMember;

/// Errors that can occur while building, loading, or searching role packages.
#[derive(Debug, Error)]
pub enum RolePackError {
    /// The corpus or prompt source could not be read or parsed.
    #[error("Source read error ({}): {message}", .path.display())]
    SourceReadError {
        /// The source that failed.
        path: PathBuf,
        /// A description of the failure.
        message: String,
    },

    /// The embedding capability failed or timed out.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The rerank capability failed or timed out.
    #[error("Reranker error ({reranker}): {message}")]
    RerankerError {
        /// The reranker that produced the error.
        reranker: String,
        /// A description of the failure.
        message: String,
    },

    /// A vector did not have the width of the index it belongs to.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The width required by the index or provider.
        expected: usize,
        /// The width actually observed.
        actual: usize,
    },

    /// Archive assembly or destination I/O failed.
    #[error("Packaging error: {0}")]
    PackagingError(String),

    /// The archive container or one of its members could not be parsed.
    #[error("Malformed archive: {0}")]
    MalformedArchive(String),

    /// A required archive member is absent.
    #[error("Missing package member '{member}' ({})", .member.file_name())]
    MissingMember {
        /// The absent member.
        member: PackageMember,
    },

    /// The corpus and the vector index disagree on the number of records.
    #[error("Corpus has {corpus_len} records but index has {index_len} vectors")]
    CorpusIndexSizeMismatch {
        /// Number of corpus records.
        corpus_len: usize,
        /// Number of index vectors.
        index_len: usize,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl RolePackError {
    pub(crate) fn source_read(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::SourceReadError { path: path.into(), message: message.to_string() }
    }
}

/// A convenience result type for role package operations.
pub type Result<T> = std::result::Result<T, RolePackError>;
