//! # thesis-qa
//!
//! Retrieval-augmented question answering over a folder of PDF documents.
//! Pages are extracted, split into overlapping chunks, embedded with a
//! sentence-transformer running on candle, and stored in a SQLite-backed
//! vector index. Questions are answered by an OpenAI-compatible chat model
//! grounded on the most similar chunks, with citations back to document and
//! page.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use thesis_qa::{Config, QaService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(None)?;
//!     let mut service = QaService::from_config(config)?;
//!
//!     // Build the index on first run, load it afterwards
//!     let report = service.setup(false)?;
//!     println!("Indexed {} chunks", report.chunks);
//!
//!     let answer = service.ask("What sampling method was used?").await?;
//!     println!("{}", answer.text);
//!     for source in &answer.sources {
//!         println!("  {} p.{}: {}", source.document, source.page, source.snippet);
//!     }
//!
//!     Ok(())
//! }
//! ```

// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod ml;
pub mod storage;
pub mod text;
pub mod utils;

// Re-export main API types
pub use api::{
    Answer, Availability, Citation, Generator, OpenAiGenerator, PipelineState, PromptTemplate,
    QaService, RagPipeline, SetupAction, SetupReport,
};
pub use config::Config;
pub use error::{QaError, Result};

// Re-export commonly used types
pub use ml::{Embedder, IndexStats, ScoredChunk};
pub use text::Chunk;
