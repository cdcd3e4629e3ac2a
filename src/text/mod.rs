//! Document ingestion and chunking for thesis-qa
//!
//! This module discovers PDF files, extracts their page text, and cuts the
//! pages into overlapping chunks ready for embedding.

pub mod chunking;
pub mod pdf;

// Re-export main types and functions
pub use chunking::{Chunk, DEFAULT_SEPARATORS, TextChunker};
pub use pdf::{Document, Ingestion, PageText, PdfProcessor};
