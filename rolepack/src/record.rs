//! Data types for question/answer records and retrieval results.

use serde::{Deserialize, Serialize};

/// One question/answer exemplar from a character's corpus.
///
/// Records carry no identifier of their own; a record is addressed by its
/// position in the [`CorpusStore`](crate::CorpusStore) that holds it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct QaRecord {
    /// The prompt side of the exchange. This is the text that gets embedded.
    pub question: String,
    /// The character's reply.
    pub answer: String,
}

impl QaRecord {
    /// Create a record from a question and its answer.
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self { question: question.into(), answer: answer.into() }
    }
}

/// A recalled [`QaRecord`] paired with its rerank relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredExemplar {
    /// The retrieved record.
    pub record: QaRecord,
    /// The rerank score (higher is more relevant).
    pub score: f32,
    /// Position of the record in the corpus.
    pub position: usize,
    /// Squared Euclidean distance between the query and the record's vector.
    pub distance: f32,
}

/// Exemplars for one query, ordered by descending relevance score.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    exemplars: Vec<ScoredExemplar>,
}

impl RetrievalResult {
    pub(crate) fn new(exemplars: Vec<ScoredExemplar>) -> Self {
        Self { exemplars }
    }

    /// An empty result.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of exemplars.
    pub fn len(&self) -> usize {
        self.exemplars.len()
    }

    /// Whether the result holds no exemplars.
    pub fn is_empty(&self) -> bool {
        self.exemplars.is_empty()
    }

    /// Iterate over exemplars, most relevant first.
    pub fn iter(&self) -> std::slice::Iter<'_, ScoredExemplar> {
        self.exemplars.iter()
    }

    /// Borrow the exemplars as a slice.
    pub fn exemplars(&self) -> &[ScoredExemplar] {
        &self.exemplars
    }

    /// Corpus positions in result order.
    pub fn positions(&self) -> Vec<usize> {
        self.exemplars.iter().map(|e| e.position).collect()
    }

    /// Consume the result, returning `(record, score)` pairs in order.
    pub fn into_pairs(self) -> Vec<(QaRecord, f32)> {
        self.exemplars.into_iter().map(|e| (e.record, e.score)).collect()
    }
}

impl IntoIterator for RetrievalResult {
    type Item = ScoredExemplar;
    type IntoIter = std::vec::IntoIter<ScoredExemplar>;

    fn into_iter(self) -> Self::IntoIter {
        self.exemplars.into_iter()
    }
}

impl<'a> IntoIterator for &'a RetrievalResult {
    type Item = &'a ScoredExemplar;
    type IntoIter = std::slice::Iter<'a, ScoredExemplar>;

    fn into_iter(self) -> Self::IntoIter {
        self.exemplars.iter()
    }
}
