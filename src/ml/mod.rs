//! Machine learning module for thesis-qa
//!
//! Embedding generation with candle, vector search, and the persisted chunk
//! index built on top of them.

pub mod device;
pub mod embedding;
pub mod index;
pub mod models;
pub mod search;
pub mod text;

// Re-export main types and functions
pub use device::{DeviceType, select_device};
pub use embedding::{
    BertEmbedder, CachedEmbedder, Embedder, Embedding, EmbeddingBackend, EmbeddingConfig,
    HashingEmbedder, build_embedder, normalize,
};
pub use index::{IndexManager, IndexStats, ScoredChunk};
pub use models::{ModelFiles, ModelManager};
pub use search::{SearchConfig, VectorSearch, VectorSearchIndex, cosine_similarity};
pub use text::{TextConfig, TextProcessor, TokenizedText};
