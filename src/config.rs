//! Configuration for thesis-qa
//!
//! The configuration is a serde tree read from TOML. Every section has
//! defaults, so an absent file or a partial file is fine.

use crate::error::{QaError, Result};
use crate::ml::embedding::EmbeddingConfig;
use crate::ml::search::SearchConfig;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "thesis-qa.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub llm: LlmConfig,
}

/// Filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Folder scanned for PDF files
    pub documents_dir: PathBuf,
    /// Directory holding the persisted index
    pub index_dir: PathBuf,
    /// Prompt template with `{context}` and `{question}` placeholders
    pub prompt_template: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            documents_dir: PathBuf::from("data"),
            index_dir: PathBuf::from("vector_db"),
            prompt_template: PathBuf::from("prompts/qa_prompt.txt"),
        }
    }
}

/// Text chunking parameters, all measured in characters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target maximum chunk length
    pub chunk_size: usize,
    /// Characters shared between neighbouring chunks
    pub overlap: usize,
    /// Chunks whose stripped length is not above this are dropped
    pub min_content_length: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 2000,
            overlap: 300,
            min_content_length: 200,
        }
    }
}

/// Generative model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Model name sent with each request
    pub model: String,
    /// Base URL of an OpenAI-compatible API, `None` for api.openai.com
    pub base_url: Option<String>,
    /// Environment variable (and secrets key) holding the API key
    pub api_key_env: String,
    /// Optional TOML file consulted when the environment has no key
    pub secrets_file: Option<PathBuf>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            secrets_file: Some(PathBuf::from("secrets.toml")),
            max_tokens: 500,
            temperature: 0.2,
        }
    }
}

impl LlmConfig {
    /// Look up the API key in the environment, then in the secrets file
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Ok(key) = std::env::var(&self.api_key_env) {
            let key = key.trim();
            if !key.is_empty() {
                return Some(key.to_string());
            }
        }

        let secrets_file = self.secrets_file.as_ref()?;
        if !secrets_file.exists() {
            return None;
        }

        match read_secret(secrets_file, &self.api_key_env) {
            Ok(key) => key,
            Err(e) => {
                log::warn!("Ignoring unreadable secrets file {}: {}", secrets_file.display(), e);
                None
            }
        }
    }
}

fn read_secret(path: &Path, key: &str) -> Result<Option<String>> {
    let content = std::fs::read_to_string(path)?;
    let table: toml::Table = toml::from_str(&content)?;
    Ok(table
        .get(key)
        .and_then(|value| value.as_str())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string))
}

impl Config {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            QaError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load the given file, or `thesis-qa.toml` if present, or defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE),
            None => {
                log::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Reject parameter combinations the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(QaError::Config("chunk_size must be greater than zero".to_string()));
        }
        if self.chunking.overlap >= self.chunking.chunk_size {
            return Err(QaError::Config(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.overlap, self.chunking.chunk_size
            )));
        }
        if self.search.top_k == 0 {
            return Err(QaError::Config("top_k must be at least 1".to_string()));
        }
        if self.embedding.dimension == 0 {
            return Err(QaError::Config("embedding dimension must be greater than zero".to_string()));
        }

        let index_dir = lexical_absolute(&self.paths.index_dir)?;
        let documents_dir = lexical_absolute(&self.paths.documents_dir)?;
        if documents_dir.starts_with(&index_dir) {
            return Err(QaError::Config(format!(
                "index_dir ({}) must not be or contain documents_dir ({})",
                self.paths.index_dir.display(),
                self.paths.documents_dir.display()
            )));
        }
        Ok(())
    }
}

/// Absolute form of `path` with `.` components dropped, without touching the filesystem
fn lexical_absolute(path: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    Ok(absolute
        .components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect())
}
