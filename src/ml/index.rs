//! Chunk index: associates each chunk with its vector and persists both
//!
//! Vector ids are positions in the chunk list, so the two stay in step as
//! long as chunks and embeddings are added together.

use crate::error::{QaError, Result};
use crate::ml::embedding::Embedding;
use crate::ml::search::{SearchConfig, VectorSearch, VectorSearchIndex};
use crate::storage::schema::{KEY_CHUNK_COUNT, KEY_CREATED_AT, KEY_DIMENSION, KEY_MODEL_NAME};
use crate::storage::{Database, INDEX_FILE};
use crate::text::Chunk;
use crate::utils::ensure_directory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// A retrieved chunk with its cosine similarity to the query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Index statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    /// Total number of chunks indexed
    pub total_chunks: usize,
    /// Distinct source documents
    pub documents: usize,
    /// Distinct (document, page) pairs
    pub pages: usize,
    pub dimension: usize,
    pub model_name: String,
    /// "hnsw" or "exact"
    pub index_type: String,
    pub avg_chunk_chars: f32,
    pub created_at: DateTime<Utc>,
}

/// Owns the chunks and vectors of one index
pub struct IndexManager {
    chunks: Vec<Chunk>,
    search_index: VectorSearchIndex,
    model_name: String,
    created_at: DateTime<Utc>,
}

impl IndexManager {
    pub fn new(dimension: usize, model_name: &str, config: SearchConfig) -> Self {
        Self {
            chunks: Vec::new(),
            search_index: VectorSearchIndex::new(dimension, config),
            model_name: model_name.to_string(),
            created_at: Utc::now(),
        }
    }

    /// Add chunks with their embeddings, pairwise
    pub fn add_chunks(&mut self, chunks: Vec<Chunk>, embeddings: Vec<Embedding>) -> Result<()> {
        if chunks.len() != embeddings.len() {
            return Err(QaError::Search(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }

        self.search_index.add_batch(embeddings)?;
        self.chunks.extend(chunks);
        Ok(())
    }

    /// Prepare the search structure after all chunks are added
    pub fn build(&mut self) -> Result<()> {
        self.search_index.build()
    }

    /// Top `k` chunks for a query vector, highest similarity first
    pub fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let hits = self.search_index.search(query_embedding, k)?;

        hits.into_iter()
            .map(|(id, score)| {
                let chunk = self.chunks.get(id).cloned().ok_or_else(|| {
                    QaError::Search(format!("Vector {} has no chunk", id))
                })?;
                Ok(ScoredChunk { chunk, score })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.search_index.dimension()
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Get index statistics
    pub fn stats(&self) -> IndexStats {
        let documents: HashSet<&str> = self.chunks.iter().map(|c| c.source.as_str()).collect();
        let pages: HashSet<(&str, u32)> = self
            .chunks
            .iter()
            .map(|c| (c.source.as_str(), c.page))
            .collect();
        let total_chars: usize = self.chunks.iter().map(Chunk::char_len).sum();

        IndexStats {
            total_chunks: self.chunks.len(),
            documents: documents.len(),
            pages: pages.len(),
            dimension: self.dimension(),
            model_name: self.model_name.clone(),
            index_type: if self.search_index.has_hnsw() { "hnsw" } else { "exact" }.to_string(),
            avg_chunk_chars: if self.chunks.is_empty() {
                0.0
            } else {
                total_chars as f32 / self.chunks.len() as f32
            },
            created_at: self.created_at,
        }
    }

    /// Write the index into `dir`, which must not already hold an index
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        ensure_directory(dir)?;

        let embeddings: Vec<Embedding> = (0..self.search_index.len())
            .filter_map(|id| self.search_index.vector(id).cloned())
            .collect();

        let mut db = Database::create(dir.join(INDEX_FILE))?;
        db.insert_entries(&self.chunks, &embeddings)?;
        db.set_metadata(KEY_MODEL_NAME, &self.model_name)?;
        db.set_metadata(KEY_DIMENSION, &self.dimension().to_string())?;
        db.set_metadata(KEY_CHUNK_COUNT, &self.chunks.len().to_string())?;
        db.set_metadata(KEY_CREATED_AT, &self.created_at.to_rfc3339())?;

        log::info!("Saved index with {} chunks to {}", self.chunks.len(), dir.display());
        Ok(())
    }

    /// Load a persisted index from `dir` and build its search structure
    pub fn load<P: AsRef<Path>>(dir: P, config: SearchConfig) -> Result<Self> {
        let dir = dir.as_ref();
        let db = Database::open(dir.join(INDEX_FILE))?;

        let dimension: usize = db
            .get_metadata(KEY_DIMENSION)?
            .ok_or_else(|| QaError::Storage("Index is missing its dimension".to_string()))?
            .parse()
            .map_err(|e| QaError::Storage(format!("Invalid index dimension: {}", e)))?;
        let model_name = db.get_metadata(KEY_MODEL_NAME)?.unwrap_or_default();
        let created_at = db
            .get_metadata(KEY_CREATED_AT)?
            .and_then(|value| DateTime::parse_from_rfc3339(&value).ok())
            .map(|value| value.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        let (chunks, embeddings): (Vec<Chunk>, Vec<Embedding>) = db.load_entries()?.into_iter().unzip();

        let mut index = Self {
            chunks: Vec::new(),
            search_index: VectorSearchIndex::new(dimension, config),
            model_name,
            created_at,
        };
        index.add_chunks(chunks, embeddings)?;
        index.build()?;

        log::info!("Loaded index with {} chunks from {}", index.len(), dir.display());
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(id: usize, source: &str, page: u32) -> Chunk {
        Chunk {
            id,
            text: format!("text of chunk {}", id),
            source: source.to_string(),
            page,
            split_index: 0,
        }
    }

    fn sample_index() -> IndexManager {
        let mut index = IndexManager::new(2, "hashing-2", SearchConfig::default());
        index
            .add_chunks(
                vec![chunk(0, "a.pdf", 1), chunk(1, "a.pdf", 2), chunk(2, "b.pdf", 1)],
                vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.6, 0.8]],
            )
            .unwrap();
        index.build().unwrap();
        index
    }

    #[test]
    fn test_search_returns_chunks() {
        let index = sample_index();
        let results = index.search(&[1.0, 0.0], 2).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.id, 0);
        assert_eq!(results[1].chunk.source, "b.pdf");
        assert!(results[0].score >= results[1].score);
    }

    #[test]
    fn test_mismatched_add() {
        let mut index = IndexManager::new(2, "m", SearchConfig::default());
        let result = index.add_chunks(vec![chunk(0, "a.pdf", 1)], vec![]);
        assert!(matches!(result, Err(QaError::Search(_))));
    }

    #[test]
    fn test_stats() {
        let stats = sample_index().stats();
        assert_eq!(stats.total_chunks, 3);
        assert_eq!(stats.documents, 2);
        assert_eq!(stats.pages, 3);
        assert_eq!(stats.dimension, 2);
        assert_eq!(stats.index_type, "exact");
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let index = sample_index();
        index.save(temp_dir.path()).unwrap();

        let loaded = IndexManager::load(temp_dir.path(), SearchConfig::default()).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.model_name(), "hashing-2");
        assert_eq!(loaded.chunks(), index.chunks());
        assert_eq!(
            loaded.search(&[0.0, 1.0], 1).unwrap()[0].chunk.id,
            index.search(&[0.0, 1.0], 1).unwrap()[0].chunk.id
        );
    }

    #[test]
    fn test_save_and_load_empty() {
        let temp_dir = TempDir::new().unwrap();
        IndexManager::new(8, "hashing-8", SearchConfig::default())
            .save(temp_dir.path())
            .unwrap();

        let loaded = IndexManager::load(temp_dir.path(), SearchConfig::default()).unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.dimension(), 8);
        assert!(loaded.search(&[0.0; 8], 4).unwrap().is_empty());
    }

    #[test]
    fn test_load_missing() {
        let temp_dir = TempDir::new().unwrap();
        let result = IndexManager::load(temp_dir.path(), SearchConfig::default());
        assert!(matches!(result, Err(QaError::IndexUnavailable(_))));
    }
}
