//! API layer for thesis-qa
//!
//! This module provides the retrieval pipeline and the question answering
//! service built on it.

pub mod chat;
pub mod pipeline;
pub mod prompt;

// Re-export main API types
pub use chat::{
    Answer, Availability, Citation, Generator, NO_CONTEXT_ANSWER, OpenAiGenerator, QaService,
};
pub use pipeline::{PipelineState, RagPipeline, SetupAction, SetupReport};
pub use prompt::{DEFAULT_TEMPLATE, PromptTemplate};
