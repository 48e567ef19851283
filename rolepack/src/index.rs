//! Fixed-width vector index, its binary codec, and exact nearest-neighbour scan.
//!
//! Vectors are stored row-major in one flat `Vec<f32>`; slot `i` holds the
//! embedding of corpus record `i`. [`ExemplarStore`] is the only type that
//! pairs an index with its corpus, and it refuses halves of different length.

use std::cmp::Ordering;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::corpus::CorpusStore;
use crate::error::{RolePackError, Result};
use crate::record::QaRecord;

const INDEX_MAGIC: [u8; 4] = *b"RPVI";
const INDEX_FORMAT_VERSION: u32 = 1;

/// An ordered sequence of equal-width embedding vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimensions: usize,
    data: Vec<f32>,
}

/// A recalled index slot and its squared Euclidean distance from the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Slot in the index (and in the paired corpus).
    pub position: usize,
    /// Squared Euclidean distance to the query vector.
    pub distance: f32,
}

#[derive(Serialize)]
struct EncodedIndexRef<'a> {
    magic: [u8; 4],
    format_version: u32,
    dimensions: u64,
    count: u64,
    data: &'a [f32],
}

#[derive(Deserialize)]
struct EncodedIndex {
    magic: [u8; 4],
    format_version: u32,
    dimensions: u64,
    count: u64,
    data: Vec<f32>,
}

impl VectorIndex {
    /// Create an empty index of the given width.
    ///
    /// # Errors
    ///
    /// Returns [`RolePackError::ConfigError`] if `dimensions == 0`.
    pub fn new(dimensions: usize) -> Result<Self> {
        Self::with_capacity(dimensions, 0)
    }

    /// Create an empty index with room for `capacity` vectors.
    pub fn with_capacity(dimensions: usize, capacity: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(RolePackError::ConfigError(
                "vector index dimensions must be greater than zero".to_string(),
            ));
        }
        Ok(Self { dimensions, data: Vec::with_capacity(dimensions * capacity) })
    }

    /// Build an index from individual rows, which must all be `dimensions` wide.
    pub fn from_rows<I, V>(dimensions: usize, rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: AsRef<[f32]>,
    {
        let mut index = Self::new(dimensions)?;
        for row in rows {
            index.push(row.as_ref())?;
        }
        Ok(index)
    }

    /// Append a vector, returning its position.
    ///
    /// # Errors
    ///
    /// Returns [`RolePackError::DimensionMismatch`] if `vector` has the wrong width.
    pub fn push(&mut self, vector: &[f32]) -> Result<usize> {
        if vector.len() != self.dimensions {
            return Err(RolePackError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        self.data.extend_from_slice(vector);
        Ok(self.len() - 1)
    }

    /// Width shared by every vector in the index.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of vectors.
    pub fn len(&self) -> usize {
        self.data.len() / self.dimensions
    }

    /// Whether the index holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The vector at `position`, if any.
    pub fn get(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimensions)?;
        self.data.get(start..start + self.dimensions)
    }

    /// Iterate over vectors in position order.
    pub fn iter(&self) -> std::slice::ChunksExact<'_, f32> {
        self.data.chunks_exact(self.dimensions)
    }

    /// Encode the index as the binary package member.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let encoded = EncodedIndexRef {
            magic: INDEX_MAGIC,
            format_version: INDEX_FORMAT_VERSION,
            dimensions: self.dimensions as u64,
            count: self.len() as u64,
            data: &self.data,
        };
        bincode::serde::encode_to_vec(&encoded, bincode::config::standard())
            .map_err(|e| RolePackError::PackagingError(format!("failed to encode index: {e}")))
    }

    /// Decode an index previously produced by [`to_bytes`](Self::to_bytes).
    ///
    /// # Errors
    ///
    /// Returns [`RolePackError::MalformedArchive`] for foreign, truncated, or
    /// internally inconsistent data.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (encoded, _): (EncodedIndex, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard()).map_err(|e| {
                RolePackError::MalformedArchive(format!("failed to decode index: {e}"))
            })?;

        if encoded.magic != INDEX_MAGIC {
            return Err(RolePackError::MalformedArchive("index member has bad magic".to_string()));
        }
        if encoded.format_version != INDEX_FORMAT_VERSION {
            return Err(RolePackError::MalformedArchive(format!(
                "unsupported index format version {}",
                encoded.format_version
            )));
        }
        let dimensions = usize::try_from(encoded.dimensions)
            .ok()
            .filter(|d| *d > 0)
            .ok_or_else(|| {
                RolePackError::MalformedArchive(format!(
                    "invalid index dimensions {}",
                    encoded.dimensions
                ))
            })?;
        let expected = usize::try_from(encoded.count)
            .ok()
            .and_then(|count| count.checked_mul(dimensions));
        if expected != Some(encoded.data.len()) {
            return Err(RolePackError::MalformedArchive(format!(
                "index declares {} vectors of width {} but holds {} components",
                encoded.count,
                dimensions,
                encoded.data.len()
            )));
        }

        Ok(Self { dimensions, data: encoded.data })
    }

    /// Exact k-nearest-neighbour search by squared Euclidean distance.
    ///
    /// Returns at most `k` neighbours ordered by ascending distance, equal
    /// distances ordered by ascending position. Indexes with at least
    /// `parallel_threshold` vectors are scanned on the rayon pool.
    ///
    /// # Errors
    ///
    /// Returns [`RolePackError::DimensionMismatch`] if `query` has the wrong
    /// width. An empty index or `k == 0` yields an empty list, not an error.
    pub fn nearest(
        &self,
        query: &[f32],
        k: usize,
        parallel_threshold: usize,
    ) -> Result<Vec<Neighbor>> {
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dimensions {
            return Err(RolePackError::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }

        let distances: Vec<f32> = if self.len() >= parallel_threshold {
            self.data.par_chunks_exact(self.dimensions).map(|v| squared_l2(v, query)).collect()
        } else {
            self.iter().map(|v| squared_l2(v, query)).collect()
        };

        let mut neighbors: Vec<Neighbor> = distances
            .into_iter()
            .enumerate()
            .map(|(position, distance)| Neighbor { position, distance })
            .collect();

        let k = k.min(neighbors.len());
        if k < neighbors.len() {
            neighbors.select_nth_unstable_by(k - 1, compare_neighbors);
            neighbors.truncate(k);
        }
        // Positions are unique, so the ordering is total and the unstable sort deterministic.
        neighbors.sort_unstable_by(compare_neighbors);
        Ok(neighbors)
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn compare_neighbors(a: &Neighbor, b: &Neighbor) -> Ordering {
    distance_key(a.distance)
        .total_cmp(&distance_key(b.distance))
        .then_with(|| a.position.cmp(&b.position))
}

// NaN distances sort after every real distance.
fn distance_key(distance: f32) -> f32 {
    if distance.is_nan() { f32::INFINITY } else { distance }
}

/// A corpus and its vector index, guaranteed to be the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct ExemplarStore {
    corpus: CorpusStore,
    index: VectorIndex,
}

impl ExemplarStore {
    /// Pair a corpus with its index.
    ///
    /// # Errors
    ///
    /// Returns [`RolePackError::CorpusIndexSizeMismatch`] if the two halves
    /// hold a different number of entries.
    pub fn from_parts(corpus: CorpusStore, index: VectorIndex) -> Result<Self> {
        if corpus.len() != index.len() {
            return Err(RolePackError::CorpusIndexSizeMismatch {
                corpus_len: corpus.len(),
                index_len: index.len(),
            });
        }
        Ok(Self { corpus, index })
    }

    /// The corpus half.
    pub fn corpus(&self) -> &CorpusStore {
        &self.corpus
    }

    /// The index half.
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Number of records (and vectors).
    pub fn len(&self) -> usize {
        self.corpus.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.corpus.is_empty()
    }

    /// Width of the stored vectors.
    pub fn dimensions(&self) -> usize {
        self.index.dimensions()
    }

    /// The record and vector at `position`.
    pub fn get(&self, position: usize) -> Option<(&QaRecord, &[f32])> {
        Some((self.corpus.get(position)?, self.index.get(position)?))
    }

    /// Split back into the corpus and the index.
    pub fn into_parts(self) -> (CorpusStore, VectorIndex) {
        (self.corpus, self.index)
    }
}
