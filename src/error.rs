//! Error types for thesis-qa
//!
//! This module provides error handling for every pipeline stage: ingestion,
//! chunking, embedding, index storage, retrieval and answer generation.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for question-answering operations
#[derive(Error, Debug)]
pub enum QaError {
    /// No API key is available for the generative model
    #[error("Missing configuration: {0}")]
    MissingConfiguration(String),

    /// The documents folder is absent or holds no PDF files
    #[error("No documents found in {}", .0.display())]
    NoDocumentsFound(PathBuf),

    /// Retrieval or answering attempted before a successful setup
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// An embedding or generation request failed
    #[error("External call failed: {0}")]
    ExternalCall(String),

    /// Text processing errors
    #[error("Text processing error: {0}")]
    TextProcessing(String),

    /// PDF processing errors
    #[error("PDF processing error: {0}")]
    Pdf(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Machine learning model errors
    #[error("ML model error: {0}")]
    MachineLearning(String),

    /// Vector search errors
    #[error("Search error: {0}")]
    Search(String),

    /// Index storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// SQLite database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Candle ML framework errors
    #[error("Candle ML error: {0}")]
    Candle(#[from] candle_core::Error),
}

/// Result type alias for question-answering operations
pub type Result<T> = std::result::Result<T, QaError>;

impl QaError {
    /// Whether the application can keep running in a degraded mode
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            QaError::MissingConfiguration(_)
                | QaError::NoDocumentsFound(_)
                | QaError::IndexUnavailable(_)
                | QaError::ExternalCall(_)
        )
    }

    /// Guidance shown next to the error message
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            QaError::MissingConfiguration(_) => Some(
                "Set the variable named by llm.api_key_env (OPENAI_API_KEY unless configured) in the environment or a .env file, or add it to the secrets file.",
            ),
            QaError::NoDocumentsFound(_) => {
                Some("Copy PDF files into the documents folder and run `thesis-qa setup --rebuild`.")
            }
            QaError::IndexUnavailable(_) => {
                Some("Run `thesis-qa setup` to build the vector index before asking questions.")
            }
            QaError::ExternalCall(_) => {
                Some("Check network access and the model endpoint, then ask again.")
            }
            _ => None,
        }
    }
}

// Implement From traits for external error types
impl From<toml::de::Error> for QaError {
    fn from(err: toml::de::Error) -> Self {
        QaError::Config(err.to_string())
    }
}
