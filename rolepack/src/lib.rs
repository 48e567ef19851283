//! Role packages and exemplar retrieval for character-grounded prompts.
//!
//! A *role package* bundles a character's question/answer corpus, an
//! embedding index over the questions, and the character's system prompt in
//! one zip archive. At inference time the package is loaded, the query is
//! matched against the corpus by exact vector search, the candidates are
//! reranked, and the winners are rendered as dialogue exemplars for the
//! prompt.
//!
//! This crate provides:
//! - [`CorpusStore`] and corpus source readers (JSON, JSONL, CSV)
//! - [`VectorIndexBuilder`] and the position-aligned [`ExemplarStore`]
//! - [`RolePackageBuilder`] / [`RolePackageLoader`] for the archive
//! - [`RetrievalEngine`] for recall + rerank search
//! - [`ExemplarFormatter`] for prompt context
//!
//! Embedding and reranking models are plugged in through the
//! [`EmbeddingProvider`] and [`Reranker`] traits.

pub mod builder;
pub mod config;
pub mod corpus;
mod deadline;
pub mod embedding;
pub mod error;
pub mod format;
pub mod index;
pub mod package;
pub mod record;
pub mod reranker;
pub mod retrieval;
pub mod telemetry;

pub use builder::VectorIndexBuilder;
pub use config::{
    BuildConfig, BuildConfigBuilder, RetrievalConfig, RetrievalConfigBuilder, RolePackConfig,
};
pub use corpus::CorpusStore;
pub use embedding::EmbeddingProvider;
pub use error::{Result, RolePackError};
pub use format::{DEFAULT_SPEAKER_SEPARATOR, ExemplarFormatter, format_exemplars};
pub use index::{ExemplarStore, Neighbor, VectorIndex};
pub use package::{
    MAX_MEMBER_BYTES, PackageHandle, PackageMember, RolePackage, RolePackageBuilder,
    RolePackageLoader,
};
pub use record::{QaRecord, RetrievalResult, ScoredExemplar};
pub use reranker::{NoOpReranker, Reranker};
pub use retrieval::{RetrievalEngine, RetrievalEngineBuilder};
pub use telemetry::init_tracing;
