//! Sentence embedding generation
//!
//! The [`Embedder`] trait is the seam between the pipeline and whatever turns
//! text into vectors. [`BertEmbedder`] runs a sentence-transformer model on
//! candle with mean pooling. [`HashingEmbedder`] is a deterministic,
//! offline feature-hashing embedder for tests and air-gapped machines.
//! Every embedder returns unit-length vectors.

use crate::error::{QaError, Result};
use crate::ml::device::{DeviceType, select_device};
use crate::ml::models::ModelManager;
use crate::ml::text::{TextConfig, TextProcessor};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Embedding vector type
pub type Embedding = Vec<f32>;

/// Which embedder to construct
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Sentence-transformer weights run with candle
    #[default]
    Bert,
    /// Feature hashing, no model download
    Hashing,
}

/// Configuration for embedding model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    /// Hugging Face model id or local model directory
    pub model_name: String,
    /// Maximum sequence length in tokens
    pub max_length: usize,
    /// Vector dimension of the hashing backend
    pub dimension: usize,
    /// Batch size for processing
    pub batch_size: usize,
    /// Device to use for inference
    pub device: DeviceType,
    /// Model cache directory, `None` for the hf-hub default
    pub cache_dir: Option<PathBuf>,
    /// Number of query embeddings kept in memory, 0 disables the cache
    pub query_cache_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Bert,
            model_name: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            max_length: 256,
            dimension: 384,
            batch_size: 32,
            device: DeviceType::Cpu,
            cache_dir: None,
            query_cache_size: 256,
        }
    }
}

/// Turns text into a fixed-dimension unit vector
pub trait Embedder: Send + Sync {
    /// Embed a single text
    fn embed(&self, text: &str) -> Result<Embedding>;

    /// Embed many texts, preserving order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    /// Output dimension
    fn dimension(&self) -> usize;

    /// Identifier stored with persisted indexes
    fn model_name(&self) -> &str;
}

/// Scale a vector to unit length in place. Zero vectors are left untouched.
pub fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Construct the embedder described by `config`
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let embedder: Box<dyn Embedder> = match config.backend {
        EmbeddingBackend::Bert => Box::new(BertEmbedder::load(config)?),
        EmbeddingBackend::Hashing => Box::new(HashingEmbedder::new(config.dimension)?),
    };

    match NonZeroUsize::new(config.query_cache_size) {
        Some(capacity) => Ok(Arc::new(CachedEmbedder::new(embedder, capacity))),
        None => Ok(Arc::from(embedder)),
    }
}

/// Sentence transformer running on candle
pub struct BertEmbedder {
    model: BertModel,
    text_processor: TextProcessor,
    device: Device,
    model_name: String,
    dimension: usize,
    batch_size: usize,
}

impl BertEmbedder {
    /// Fetch the model files and load the weights
    pub fn load(config: &EmbeddingConfig) -> Result<Self> {
        log::info!("Loading embedding model: {}", config.model_name);

        let files = ModelManager::new(config.cache_dir.clone())?.fetch(&config.model_name)?;
        let device = select_device(&config.device);

        let bert_config: BertConfig = serde_json::from_str(&std::fs::read_to_string(&files.config)?)?;
        // SAFETY: the weights file is not modified while mapped
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[files.weights], DTYPE, &device)? };
        let model = BertModel::load(vb, &bert_config)?;

        let text_processor = TextProcessor::from_file(
            &files.tokenizer,
            TextConfig {
                max_length: config.max_length,
                ..Default::default()
            },
        )?;

        log::info!(
            "Embedding model ready: {} (dimension {})",
            config.model_name,
            bert_config.hidden_size
        );

        Ok(Self {
            model,
            text_processor,
            device,
            model_name: config.model_name.clone(),
            dimension: bert_config.hidden_size,
            batch_size: config.batch_size.max(1),
        })
    }

    /// Run one padded batch through the model and mean-pool the token states
    fn forward_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let tokenized = texts
            .iter()
            .map(|text| self.text_processor.tokenize(text))
            .collect::<Result<Vec<_>>>()?;

        let seq_len = tokenized.iter().map(|t| t.input_ids.len()).max().unwrap_or(0).max(1);
        let batch = tokenized.len();

        let mut ids = Vec::with_capacity(batch * seq_len);
        let mut type_ids = Vec::with_capacity(batch * seq_len);
        let mut mask = Vec::with_capacity(batch * seq_len);
        for tokens in &tokenized {
            let pad = seq_len - tokens.input_ids.len();
            ids.extend(tokens.input_ids.iter().copied().chain(std::iter::repeat_n(0, pad)));
            type_ids.extend(tokens.token_type_ids.iter().copied().chain(std::iter::repeat_n(0, pad)));
            mask.extend(tokens.attention_mask.iter().copied().chain(std::iter::repeat_n(0, pad)));
        }

        let ids = Tensor::from_vec(ids, (batch, seq_len), &self.device)?;
        let type_ids = Tensor::from_vec(type_ids, (batch, seq_len), &self.device)?;
        let mask = Tensor::from_vec(mask, (batch, seq_len), &self.device)?;

        let hidden = self.model.forward(&ids, &type_ids, Some(&mask))?;

        let mask = mask.to_dtype(DType::F32)?.unsqueeze(2)?;
        let summed = hidden.to_dtype(DType::F32)?.broadcast_mul(&mask)?.sum(1)?;
        let counts = mask.sum(1)?.clamp(1e-9f32, f32::MAX)?;
        let pooled = summed.broadcast_div(&counts)?;

        let mut vectors = pooled.to_vec2::<f32>()?;
        for vector in vectors.iter_mut() {
            normalize(vector);
        }
        Ok(vectors)
    }
}

impl Embedder for BertEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        self.forward_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| QaError::MachineLearning("Model returned no embedding".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            embeddings.extend(self.forward_batch(batch)?);
        }
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Deterministic bag-of-words embedder using signed feature hashing
pub struct HashingEmbedder {
    dimension: usize,
    model_name: String,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(QaError::Config("embedding dimension must be greater than zero".to_string()));
        }
        Ok(Self {
            dimension,
            model_name: format!("hashing-{}", dimension),
        })
    }
}

// FNV-1a, stable across platforms and releases unlike DefaultHasher
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            let hash = fnv1a(token.to_lowercase().as_bytes());
            let index = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        normalize(&mut vector);
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// LRU cache in front of another embedder for repeated queries
///
/// Only single-text `embed` calls are cached. Batch calls used by index
/// builds go straight to the inner embedder.
pub struct CachedEmbedder {
    inner: Box<dyn Embedder>,
    cache: Mutex<LruCache<String, Embedding>>,
}

impl CachedEmbedder {
    pub fn new(inner: Box<dyn Embedder>, capacity: NonZeroUsize) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LruCache<String, Embedding>>> {
        self.cache
            .lock()
            .map_err(|_| QaError::MachineLearning("Embedding cache lock poisoned".to_string()))
    }
}

impl Embedder for CachedEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        if let Some(cached) = self.lock()?.get(text) {
            return Ok(cached.clone());
        }

        let embedding = self.inner.embed(text)?;
        self.lock()?.put(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        self.inner.embed_batch(texts)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
