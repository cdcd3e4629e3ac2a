//! Model file management
//!
//! Sentence-transformer weights are fetched from the Hugging Face Hub and
//! cached on disk. A model name that points at a local directory is used
//! as-is, without touching the network.

use crate::error::{QaError, Result};
use std::path::{Path, PathBuf};

/// Files every BERT-style embedding model needs
pub const REQUIRED_FILES: [&str; 3] = ["config.json", "tokenizer.json", "model.safetensors"];

/// Local paths of a model's files
#[derive(Debug, Clone, PartialEq)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: PathBuf,
}

impl ModelFiles {
    /// Use model files already present in a directory
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        for file_name in REQUIRED_FILES {
            let path = dir.join(file_name);
            if !path.is_file() {
                return Err(QaError::MachineLearning(format!(
                    "Model directory {} is missing {}",
                    dir.display(),
                    file_name
                )));
            }
        }

        Ok(Self {
            config: dir.join("config.json"),
            tokenizer: dir.join("tokenizer.json"),
            weights: dir.join("model.safetensors"),
        })
    }
}

/// Model manager for downloading and caching models
pub struct ModelManager {
    /// Cache directory for models, `None` for the hf-hub default
    cache_dir: Option<PathBuf>,
}

impl ModelManager {
    /// Create new model manager
    pub fn new(cache_dir: Option<PathBuf>) -> Result<Self> {
        if let Some(dir) = &cache_dir {
            std::fs::create_dir_all(dir)?;
        }
        Ok(Self { cache_dir })
    }

    /// Get cache directory
    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    /// Resolve a model name to local files, downloading on first use
    pub fn fetch(&self, model_name: &str) -> Result<ModelFiles> {
        let local = Path::new(model_name);
        if local.is_dir() {
            log::info!("Using local model directory {}", local.display());
            return ModelFiles::from_dir(local);
        }

        log::info!("Fetching model '{}' from Hugging Face Hub", model_name);

        let mut builder = hf_hub::api::sync::ApiBuilder::new().with_progress(false);
        if let Some(dir) = &self.cache_dir {
            builder = builder.with_cache_dir(dir.clone());
        }
        let api = builder
            .build()
            .map_err(|e| QaError::ExternalCall(format!("Failed to create HF API: {}", e)))?;
        let repo = api.model(model_name.to_string());

        let get = |file_name: &str| {
            let path = repo.get(file_name).map_err(|e| {
                QaError::ExternalCall(format!("Failed to download {}/{}: {}", model_name, file_name, e))
            })?;
            log::debug!("Resolved {}/{} to {:?}", model_name, file_name, path);
            Ok::<PathBuf, QaError>(path)
        };

        Ok(ModelFiles {
            config: get("config.json")?,
            tokenizer: get("tokenizer.json")?,
            weights: get("model.safetensors")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_model_manager_creation() {
        let temp_dir = TempDir::new().unwrap();
        let cache = temp_dir.path().join("models");
        let manager = ModelManager::new(Some(cache.clone())).unwrap();

        assert!(cache.exists());
        assert_eq!(manager.cache_dir(), Some(cache.as_path()));
    }

    #[test]
    fn test_local_model_directory() {
        let temp_dir = TempDir::new().unwrap();
        for file_name in REQUIRED_FILES {
            std::fs::write(temp_dir.path().join(file_name), b"{}").unwrap();
        }

        let manager = ModelManager::new(None).unwrap();
        let files = manager.fetch(temp_dir.path().to_str().unwrap()).unwrap();
        assert_eq!(files.weights, temp_dir.path().join("model.safetensors"));
    }

    #[test]
    fn test_incomplete_model_directory() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("config.json"), b"{}").unwrap();

        let result = ModelFiles::from_dir(temp_dir.path());
        assert!(matches!(result, Err(QaError::MachineLearning(_))));
    }
}
