//! Retrieval pipeline: ingestion, chunking, indexing and retrieval
//!
//! [`RagPipeline`] is the long-lived service object that owns the embedder
//! and the index handle. It moves through
//! `Uninitialized -> Indexed <-> Querying`: setup either builds the index
//! from the documents folder or loads the persisted one, and each retrieval
//! passes through `Querying` and back.

use crate::config::Config;
use crate::error::{QaError, Result};
use crate::ml::embedding::{Embedder, build_embedder};
use crate::ml::index::{IndexManager, IndexStats, ScoredChunk};
use crate::storage::{INDEX_FILE, remove_index};
use crate::text::{Chunk, Ingestion, PageText, PdfProcessor, TextChunker};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Lifecycle state of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    /// No index built or loaded yet
    Uninitialized,
    /// Index ready for queries
    Indexed,
    /// A retrieval is in progress
    Querying,
}

/// What setup did to obtain the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetupAction {
    Built,
    Loaded,
}

/// Summary of a setup run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupReport {
    pub action: SetupAction,
    pub documents: usize,
    pub pages: usize,
    pub chunks: usize,
    /// Recoverable problems met along the way (missing folder, unreadable files)
    pub warnings: Vec<String>,
    pub elapsed_secs: f64,
}

/// Document retrieval pipeline
pub struct RagPipeline {
    config: Config,
    embedder: Arc<dyn Embedder>,
    chunker: TextChunker,
    index: Option<IndexManager>,
    state: PipelineState,
}

impl RagPipeline {
    /// Create a pipeline with the embedder described in `config`
    pub fn new(config: Config) -> Result<Self> {
        let embedder = build_embedder(&config.embedding)?;
        Self::with_embedder(config, embedder)
    }

    /// Create a pipeline around an existing embedder
    pub fn with_embedder(config: Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        config.validate()?;
        let chunker = TextChunker::new(config.chunking.clone())?;

        Ok(Self {
            config,
            embedder,
            chunker,
            index: None,
            state: PipelineState::Uninitialized,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn index(&self) -> Option<&IndexManager> {
        self.index.as_ref()
    }

    /// Statistics of the current index, if any
    pub fn stats(&self) -> Option<IndexStats> {
        self.index.as_ref().map(IndexManager::stats)
    }

    /// Path of the index database file
    pub fn index_path(&self) -> PathBuf {
        self.config.paths.index_dir.join(INDEX_FILE)
    }

    /// Whether a persisted index is present
    pub fn index_exists(&self) -> bool {
        self.index_path().is_file()
    }

    /// Read every PDF in the documents folder
    pub fn ingest(&self) -> Result<Ingestion> {
        PdfProcessor::load_folder(&self.config.paths.documents_dir)
    }

    /// Split pages into chunks
    pub fn chunk(&self, pages: &[PageText]) -> Vec<Chunk> {
        self.chunker.chunk_pages(pages)
    }

    /// Replace the persisted index with one built from `chunks`
    pub fn build_index(&mut self, chunks: Vec<Chunk>) -> Result<()> {
        self.build_index_with_progress(chunks, |_, _| {})
    }

    /// Like [`build_index`](Self::build_index), reporting `(embedded, total)` after each batch
    pub fn build_index_with_progress<F>(&mut self, chunks: Vec<Chunk>, progress: F) -> Result<()>
    where
        F: Fn(usize, usize),
    {
        let index_dir = self.config.paths.index_dir.clone();
        if remove_index(&index_dir)? {
            log::info!("Removed previous index at {}", index_dir.display());
        }
        self.index = None;
        self.state = PipelineState::Uninitialized;

        let total = chunks.len();
        let batch_size = self.config.embedding.batch_size.max(1);
        log::info!("Embedding {} chunks in batches of {}", total, batch_size);

        let mut embeddings = Vec::with_capacity(total);
        progress(0, total);
        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            embeddings.extend(self.embedder.embed_batch(&texts).map_err(embedding_failed)?);
            progress(embeddings.len(), total);
        }

        let mut index = IndexManager::new(
            self.embedder.dimension(),
            self.embedder.model_name(),
            self.config.search.clone(),
        );
        index.add_chunks(chunks, embeddings)?;
        index.build()?;
        index.save(&index_dir)?;

        self.index = Some(index);
        self.state = PipelineState::Indexed;
        Ok(())
    }

    /// Load the persisted index without embedding anything
    pub fn load_index(&mut self) -> Result<()> {
        let index_dir = &self.config.paths.index_dir;
        let index = IndexManager::load(index_dir, self.config.search.clone())?;

        if index.dimension() != self.embedder.dimension() {
            return Err(QaError::IndexUnavailable(format!(
                "Index at {} has dimension {} but the embedding model produces {}",
                index_dir.display(),
                index.dimension(),
                self.embedder.dimension()
            )));
        }
        if index.model_name() != self.embedder.model_name() {
            log::warn!(
                "Index was built with '{}' but the current embedding model is '{}'",
                index.model_name(),
                self.embedder.model_name()
            );
        }

        self.index = Some(index);
        self.state = PipelineState::Indexed;
        Ok(())
    }

    /// Build the index if asked to or if none exists, otherwise load it
    pub fn setup(&mut self, force_rebuild: bool) -> Result<SetupReport> {
        self.setup_with_progress(force_rebuild, |_, _| {})
    }

    /// [`setup`](Self::setup) with embedding progress reporting
    pub fn setup_with_progress<F>(&mut self, force_rebuild: bool, progress: F) -> Result<SetupReport>
    where
        F: Fn(usize, usize),
    {
        let started = Instant::now();

        if !force_rebuild && self.index_exists() {
            log::info!("Loading existing index from {}", self.config.paths.index_dir.display());
            self.load_index()?;
            let stats = self.stats();
            return Ok(SetupReport {
                action: SetupAction::Loaded,
                documents: stats.as_ref().map_or(0, |s| s.documents),
                pages: stats.as_ref().map_or(0, |s| s.pages),
                chunks: stats.as_ref().map_or(0, |s| s.total_chunks),
                warnings: Vec::new(),
                elapsed_secs: started.elapsed().as_secs_f64(),
            });
        }

        log::info!("Building index from {}", self.config.paths.documents_dir.display());
        let mut warnings = Vec::new();

        let ingestion = match self.ingest() {
            Ok(ingestion) => ingestion,
            Err(e @ QaError::NoDocumentsFound(_)) => {
                log::warn!("{}; building an empty index", e);
                warnings.push(e.to_string());
                Ingestion::default()
            }
            Err(e) => return Err(e),
        };
        for (path, reason) in &ingestion.failures {
            warnings.push(format!("Skipped {}: {}", path.display(), reason));
        }

        let chunks = self.chunk(&ingestion.pages);
        let chunk_count = chunks.len();
        self.build_index_with_progress(chunks, progress)?;

        let report = SetupReport {
            action: SetupAction::Built,
            documents: ingestion.documents.len(),
            pages: ingestion.pages.len(),
            chunks: chunk_count,
            warnings,
            elapsed_secs: started.elapsed().as_secs_f64(),
        };
        log::info!(
            "Index built: {} chunks from {} documents in {:.2}s",
            report.chunks,
            report.documents,
            report.elapsed_secs
        );
        Ok(report)
    }

    /// The `k` chunks most similar to `question`
    pub fn retrieve(&mut self, question: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let Some(index) = self.index.as_ref() else {
            return Err(QaError::IndexUnavailable(
                "The vector index has not been set up".to_string(),
            ));
        };

        self.state = PipelineState::Querying;
        let result = self
            .embedder
            .embed(question)
            .map_err(embedding_failed)
            .and_then(|query| index.search(&query, k));
        self.state = PipelineState::Indexed;

        let results = result?;
        log::debug!("Retrieved {} chunks for question", results.len());
        Ok(results)
    }
}

fn embedding_failed(error: QaError) -> QaError {
    match error {
        QaError::ExternalCall(_) => error,
        other => QaError::ExternalCall(format!("Embedding failed: {}", other)),
    }
}
