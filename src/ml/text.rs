//! Text preprocessing and tokenization for ML models
//!
//! Wraps a Hugging Face `tokenizers` tokenizer with unicode normalization
//! and truncation to the model's maximum sequence length.

use crate::error::{QaError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokenizers::{Tokenizer, TruncationParams};
use unicode_normalization::UnicodeNormalization;

/// Text preprocessing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextConfig {
    /// Maximum sequence length in tokens
    pub max_length: usize,
    /// Whether to add special tokens (CLS, SEP)
    pub add_special_tokens: bool,
    /// Whether to normalize unicode
    pub normalize_unicode: bool,
    /// Whether to lowercase text
    pub lowercase: bool,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            max_length: 256,
            add_special_tokens: true,
            normalize_unicode: true,
            lowercase: false, // SentenceTransformers typically preserve case
        }
    }
}

/// Tokenized text ready for model inference
#[derive(Debug, Clone)]
pub struct TokenizedText {
    /// Token IDs
    pub input_ids: Vec<u32>,
    /// Attention mask (1 for real tokens)
    pub attention_mask: Vec<u32>,
    /// Token type IDs (for BERT-style models)
    pub token_type_ids: Vec<u32>,
}

/// Text preprocessor and tokenizer
pub struct TextProcessor {
    tokenizer: Tokenizer,
    config: TextConfig,
}

impl TextProcessor {
    /// Load a `tokenizer.json` file and configure truncation
    pub fn from_file<P: AsRef<Path>>(path: P, config: TextConfig) -> Result<Self> {
        let path = path.as_ref();
        let mut tokenizer = Tokenizer::from_file(path).map_err(|e| {
            QaError::MachineLearning(format!("Failed to load tokenizer {}: {}", path.display(), e))
        })?;

        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_length,
                ..Default::default()
            }))
            .map_err(|e| QaError::MachineLearning(format!("Invalid truncation settings: {}", e)))?;
        tokenizer.with_padding(None);

        log::info!("Loaded tokenizer from {:?}", path);
        Ok(Self { tokenizer, config })
    }

    /// Preprocess text (normalize, clean, etc.)
    pub fn preprocess_text(&self, text: &str) -> String {
        preprocess(text, &self.config)
    }

    /// Tokenize text for model inference
    pub fn tokenize(&self, text: &str) -> Result<TokenizedText> {
        let preprocessed = self.preprocess_text(text);

        let encoding = self
            .tokenizer
            .encode(preprocessed, self.config.add_special_tokens)
            .map_err(|e| QaError::MachineLearning(format!("Tokenization failed: {}", e)))?;

        Ok(TokenizedText {
            input_ids: encoding.get_ids().to_vec(),
            attention_mask: encoding.get_attention_mask().to_vec(),
            token_type_ids: encoding.get_type_ids().to_vec(),
        })
    }

    /// Get tokenizer vocabulary size
    pub fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(false)
    }

    /// Get configuration
    pub fn config(&self) -> &TextConfig {
        &self.config
    }
}

fn preprocess(text: &str, config: &TextConfig) -> String {
    let mut processed = if config.normalize_unicode {
        text.nfc().collect::<String>()
    } else {
        text.to_string()
    };

    if config.lowercase {
        processed = processed.to_lowercase();
    }

    processed.split_whitespace().collect::<Vec<&str>>().join(" ")
}
