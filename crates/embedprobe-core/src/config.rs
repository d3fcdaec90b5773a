//! Configuration management for embedprobe

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::banding::BandingPolicy;
use crate::error::{Error, Result};

/// Main configuration for embedprobe
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub models: ModelsConfig,
    pub inference: InferenceConfig,
    pub similarity: SimilarityConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        for path in Self::config_locations() {
            if path.exists() {
                return Self::load_from_path(&path);
            }
        }

        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        info!("Loading config from: {}", path.display());
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get default configuration file locations
    pub fn config_locations() -> Vec<PathBuf> {
        let mut locations = vec![PathBuf::from(".embedprobe.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            locations.push(config_dir.join("embedprobe").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            locations.push(home.join(".embedprobe.toml"));
        }

        locations
    }

    /// Directory holding downloaded models and tokenizer files
    ///
    /// Uses `models.cache_dir` when set, otherwise `<cache_dir>/embedprobe`.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.models.cache_dir {
            return Ok(dir.clone());
        }
        dirs::cache_dir()
            .map(|dir| dir.join("embedprobe"))
            .ok_or_else(|| Error::Config("Could not determine cache directory".into()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.models.hub_url.starts_with("http://") && !self.models.hub_url.starts_with("https://")
        {
            return Err(Error::Config(format!(
                "Invalid hub_url '{}': must start with http:// or https://",
                self.models.hub_url
            )));
        }

        if self.models.tokenizer_repo.split('/').filter(|s| !s.is_empty()).count() != 2 {
            return Err(Error::Config(format!(
                "Invalid tokenizer_repo '{}': expected '<owner>/<name>'",
                self.models.tokenizer_repo
            )));
        }

        if self.inference.intra_threads == 0 || self.inference.intra_threads > 64 {
            return Err(Error::Config(format!(
                "Invalid intra_threads {}: must be between 1 and 64",
                self.inference.intra_threads
            )));
        }

        if self.inference.optimization_level > 3 {
            return Err(Error::Config(format!(
                "Invalid optimization_level {}: must be between 0 and 3",
                self.inference.optimization_level
            )));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::Config(format!(
                "Invalid log level '{}': must be one of {:?}",
                self.logging.level, valid_log_levels
            )));
        }

        Ok(())
    }
}

/// Model download and cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Base URL of the model hub
    pub hub_url: String,
    /// Repository the tokenizer files are fetched from
    pub tokenizer_repo: String,
    /// Catalog id of the model used when none is given
    pub default_model: String,
    /// Override for the download cache directory
    pub cache_dir: Option<PathBuf>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            hub_url: "https://huggingface.co".to_string(),
            tokenizer_repo: "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2"
                .to_string(),
            default_model: "custom-minilm".to_string(),
            cache_dir: None,
        }
    }
}

/// Inference runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Threads used inside a single operator
    pub intra_threads: usize,
    /// Graph optimization level (0 = disabled, 3 = all)
    pub optimization_level: u8,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            intra_threads: 4,
            optimization_level: 3,
        }
    }
}

/// Similarity reporting configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    /// Banding policy: detailed or coarse
    pub policy: BandingPolicy,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
