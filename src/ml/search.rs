//! Vector similarity search
//!
//! Small indexes are scanned exactly. Once an index reaches
//! `hnsw_threshold` vectors an instant-distance HNSW graph is built as well
//! and used for queries whose `k` fits within `ef_search`.

use crate::error::{QaError, Result};
use crate::ml::embedding::Embedding;
use instant_distance::{Builder, HnswMap, Point, Search};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of chunks retrieved per question
    pub top_k: usize,
    /// Minimum index size for building an HNSW graph
    pub hnsw_threshold: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    /// Seed for HNSW layer assignment
    pub seed: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            hnsw_threshold: 2048,
            ef_construction: 100,
            ef_search: 64,
            seed: 42,
        }
    }
}

/// Nearest-neighbour lookup over stored vectors
pub trait VectorSearch {
    /// Up to `k` `(id, similarity)` pairs, highest similarity first
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>>;
}

/// Cosine similarity, 0 when either vector is all zeros
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Point wrapper for instant-distance using cosine distance
#[derive(Clone, Debug)]
pub struct VectorPoint(pub Vec<f32>);

impl Point for VectorPoint {
    fn distance(&self, other: &Self) -> f32 {
        1.0 - cosine_similarity(&self.0, &other.0)
    }
}

/// In-memory vector index
pub struct VectorSearchIndex {
    config: SearchConfig,
    dimension: usize,
    vectors: Vec<Embedding>,
    hnsw: Option<HnswMap<VectorPoint, usize>>,
}

impl VectorSearchIndex {
    pub fn new(dimension: usize, config: SearchConfig) -> Self {
        Self {
            config,
            dimension,
            vectors: Vec::new(),
            hnsw: None,
        }
    }

    /// Add a vector, returning its id
    pub fn add(&mut self, embedding: Embedding) -> Result<usize> {
        if embedding.len() != self.dimension {
            return Err(QaError::Search(format!(
                "Vector dimension {} does not match index dimension {}",
                embedding.len(),
                self.dimension
            )));
        }
        self.vectors.push(embedding);
        self.hnsw = None;
        Ok(self.vectors.len() - 1)
    }

    /// Add many vectors, returning their ids
    pub fn add_batch(&mut self, embeddings: Vec<Embedding>) -> Result<Vec<usize>> {
        embeddings.into_iter().map(|e| self.add(e)).collect()
    }

    /// Build the HNSW graph if the index is large enough
    pub fn build(&mut self) -> Result<()> {
        if self.vectors.len() < self.config.hnsw_threshold.max(1) {
            log::debug!(
                "{} vectors below HNSW threshold {}, using exact search",
                self.vectors.len(),
                self.config.hnsw_threshold
            );
            self.hnsw = None;
            return Ok(());
        }

        log::info!(
            "Building HNSW index with {} vectors, dimension {}",
            self.vectors.len(),
            self.dimension
        );

        let points: Vec<VectorPoint> = self.vectors.iter().cloned().map(VectorPoint).collect();
        let ids: Vec<usize> = (0..self.vectors.len()).collect();
        let map = Builder::default()
            .ef_construction(self.config.ef_construction)
            .ef_search(self.config.ef_search)
            .seed(self.config.seed)
            .build(points, ids);

        self.hnsw = Some(map);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn has_hnsw(&self) -> bool {
        self.hnsw.is_some()
    }

    /// Stored vector by id
    pub fn vector(&self, id: usize) -> Option<&Embedding> {
        self.vectors.get(id)
    }

    /// Score every stored vector
    pub fn search_exact(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .par_iter()
            .enumerate()
            .map(|(id, vector)| (id, cosine_similarity(query, vector)))
            .collect();

        sort_results(&mut scored);
        scored.truncate(k);
        scored
    }

    fn search_hnsw(&self, map: &HnswMap<VectorPoint, usize>, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let mut search = Search::default();
        let point = VectorPoint(query.to_vec());
        let mut results: Vec<(usize, f32)> = map
            .search(&point, &mut search)
            .take(k)
            .map(|item| (*item.value, 1.0 - item.distance))
            .collect();

        sort_results(&mut results);
        results
    }
}

impl VectorSearch for VectorSearchIndex {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dimension {
            return Err(QaError::Search(format!(
                "Query dimension {} does not match index dimension {}",
                query.len(),
                self.dimension
            )));
        }
        if query.iter().any(|x| !x.is_finite()) {
            return Err(QaError::Search("Query vector contains non-finite values".to_string()));
        }
        if k == 0 || self.vectors.is_empty() {
            return Ok(Vec::new());
        }

        match &self.hnsw {
            Some(map) if k <= self.config.ef_search => Ok(self.search_hnsw(map, query, k)),
            _ => Ok(self.search_exact(query, k)),
        }
    }
}

/// Descending score, ties broken by ascending id
fn sort_results(results: &mut [(usize, f32)]) {
    results.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
}
