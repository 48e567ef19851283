//! Deterministic embedding and rerank capabilities shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rolepack::{EmbeddingProvider, Reranker, Result, RolePackError};

/// A stable pseudo-embedding derived from the bytes of `text`.
pub fn text_vector(text: &str, dims: usize) -> Vec<f32> {
    (0..dims)
        .map(|i| {
            let acc = text
                .bytes()
                .enumerate()
                .fold(17u32, |acc, (j, b)| {
                    acc.wrapping_mul(31).wrapping_add(b as u32 * (i as u32 + j as u32 + 1))
                });
            (acc % 1000) as f32 / 1000.0
        })
        .collect()
}

/// Looks texts up in a table and falls back to [`text_vector`].
pub struct MapEmbedder {
    dims: usize,
    table: HashMap<String, Vec<f32>>,
    calls: AtomicUsize,
}

impl MapEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims, table: HashMap::new(), calls: AtomicUsize::new(0) }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.table.insert(text.to_string(), vector);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for MapEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.table.get(text).cloned().unwrap_or_else(|| text_vector(text, self.dims)))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn name(&self) -> &str {
        "map"
    }
}

/// Returns the same vector for every text.
pub struct FixedEmbedder(pub Vec<f32>);

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(self.0.clone())
    }

    fn dimensions(&self) -> usize {
        self.0.len()
    }
}

/// Fails every call.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RolePackError::EmbeddingError {
            provider: "failing".into(),
            message: "model server unavailable".into(),
        })
    }

    fn dimensions(&self) -> usize {
        4
    }
}

/// Scores candidates from a table; unknown candidates score `0.0`.
#[derive(Default)]
pub struct MapReranker {
    scores: HashMap<String, f32>,
}

impl MapReranker {
    pub fn with(mut self, candidate: &str, score: f32) -> Self {
        self.scores.insert(candidate.to_string(), score);
        self
    }
}

#[async_trait]
impl Reranker for MapReranker {
    async fn score(&self, _query: &str, candidate: &str) -> Result<f32> {
        Ok(self.scores.get(candidate).copied().unwrap_or(0.0))
    }

    fn name(&self) -> &str {
        "map"
    }
}

/// Scores a candidate by its byte length.
pub struct LengthReranker;

#[async_trait]
impl Reranker for LengthReranker {
    async fn score(&self, _query: &str, candidate: &str) -> Result<f32> {
        Ok(candidate.len() as f32)
    }
}

/// Fails every call.
pub struct FailingReranker;

#[async_trait]
impl Reranker for FailingReranker {
    async fn score(&self, _query: &str, _candidate: &str) -> Result<f32> {
        Err(RolePackError::RerankerError {
            reranker: "failing".into(),
            message: "cross-encoder crashed".into(),
        })
    }
}

/// Returns one score too few.
pub struct ShortReranker;

#[async_trait]
impl Reranker for ShortReranker {
    async fn score(&self, _query: &str, _candidate: &str) -> Result<f32> {
        Ok(1.0)
    }

    async fn score_batch(&self, _query: &str, candidates: &[&str]) -> Result<Vec<f32>> {
        Ok(vec![1.0; candidates.len().saturating_sub(1)])
    }
}

/// Sleeps before scoring.
pub struct SlowReranker(pub Duration);

#[async_trait]
impl Reranker for SlowReranker {
    async fn score(&self, _query: &str, _candidate: &str) -> Result<f32> {
        tokio::time::sleep(self.0).await;
        Ok(1.0)
    }
}
