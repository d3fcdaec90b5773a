//! Model catalog, download, and on-disk cache

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use embedprobe_core::{Config, Error, Result};

use crate::vocab::VocabularyStore;

/// Tokenizer behavior config file name
pub const TOKENIZER_CONFIG_FILENAME: &str = "tokenizer_config.json";
/// Tokenizer vocabulary/model data file name
pub const TOKENIZER_FILENAME: &str = "tokenizer.json";
pub const SPECIAL_TOKENS_MAP_FILENAME: &str = "special_tokens_map.json";

/// Every file fetched from the tokenizer repository
pub const TOKENIZER_FILES: [&str; 3] = [
    TOKENIZER_CONFIG_FILENAME,
    TOKENIZER_FILENAME,
    SPECIAL_TOKENS_MAP_FILENAME,
];

const MULTILINGUAL_REPO: &str = "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2";

/// A selectable embedding model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelOption {
    /// Stable identifier used on the command line and in config
    pub id: &'static str,
    pub label: &'static str,
    /// Hub repository, `<owner>/<name>`
    pub repo: &'static str,
    /// Path of the ONNX file inside the repository
    pub file_name: &'static str,
    /// Fixed sequence length the model is fed
    pub max_length: usize,
    pub description: &'static str,
    /// Whether the graph takes a `token_type_ids` input
    pub needs_token_type_ids: bool,
}

impl ModelOption {
    /// Download URL under the given hub base
    pub fn model_url(&self, hub_url: &str) -> String {
        format!(
            "{}/{}/resolve/main/{}",
            hub_url.trim_end_matches('/'),
            self.repo,
            self.file_name
        )
    }

    /// The unoptimized-graph variants weigh roughly 470MB each
    pub fn is_large(&self) -> bool {
        ["model_O1", "model_O2", "model_O3"]
            .iter()
            .any(|marker| self.file_name.contains(marker))
    }

    /// Warning shown before downloading, empty for ordinary sizes
    pub fn size_warning(&self) -> &'static str {
        if self.is_large() {
            "This model is approximately 470MB and may take a few minutes to download."
        } else {
            ""
        }
    }
}

#[cfg(target_os = "ios")]
const QUANTIZED_MODEL: ModelOption = ModelOption {
    id: "qint8-arm64",
    label: "Quantized for ARM64 (iOS)",
    repo: MULTILINGUAL_REPO,
    file_name: "onnx/model_qint8_arm64.onnx",
    max_length: 12,
    description: "8-bit quantized for ARM64 processors",
    needs_token_type_ids: true,
};

#[cfg(not(target_os = "ios"))]
const QUANTIZED_MODEL: ModelOption = ModelOption {
    id: "quint8-avx2",
    label: "Quantized (General)",
    repo: MULTILINGUAL_REPO,
    file_name: "onnx/model_quint8_avx2.onnx",
    max_length: 12,
    description: "8-bit quantized for general use",
    needs_token_type_ids: true,
};

const fn optimized(id: &'static str, label: &'static str, file_name: &'static str, description: &'static str) -> ModelOption {
    ModelOption {
        id,
        label,
        repo: MULTILINGUAL_REPO,
        file_name,
        max_length: 12,
        description,
        needs_token_type_ids: true,
    }
}

static CATALOG: [ModelOption; 7] = [
    ModelOption {
        id: "custom-minilm",
        label: "Custom ONNX (eldoon101/idk-parahrase-miniLM-onnxver)",
        repo: "eldoon101/idk-parahrase-miniLM-onnxver",
        file_name: "paraphrase_multilingual_miniLM_L12_v2.onnx",
        max_length: 128,
        description: "Custom implementation",
        needs_token_type_ids: false,
    },
    ModelOption {
        id: "official",
        label: "Official onnx/model.onnx",
        repo: MULTILINGUAL_REPO,
        file_name: "onnx/model.onnx",
        max_length: 12,
        description: "Standard ONNX version",
        needs_token_type_ids: true,
    },
    optimized("o1", "Optimized Level 1", "onnx/model_O1.onnx", "Optimization level 1"),
    optimized("o2", "Optimized Level 2", "onnx/model_O2.onnx", "Optimization level 2"),
    optimized("o3", "Optimized Level 3", "onnx/model_O3.onnx", "Optimization level 3"),
    optimized(
        "o4",
        "Optimized Level 4",
        "onnx/model_O4.onnx",
        "Optimization level 4 (half precision)",
    ),
    QUANTIZED_MODEL,
];

/// All selectable models, in display order
pub fn catalog() -> &'static [ModelOption] {
    &CATALOG
}

/// Look up a catalog entry by id
pub fn find_model(id: &str) -> Result<&'static ModelOption> {
    CATALOG.iter().find(|m| m.id == id).ok_or_else(|| {
        let known: Vec<&str> = CATALOG.iter().map(|m| m.id).collect();
        Error::NotFound(format!("Unknown model '{}'; known models: {}", id, known.join(", ")))
    })
}

/// Human-readable size with 1024-based units
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let formatted = format!("{:.2}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}

/// Fetches the blob behind a URL into a local file
pub trait BlobFetcher {
    /// Write the body at `url` to `dest`, returning the byte count
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// Plain HTTP(S) fetcher
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher;

impl BlobFetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        debug!("Downloading {} to {:?}", url, dest);

        let response = match ureq::get(url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => {
                return Err(Error::Download(format!(
                    "Failed to download {}: HTTP status {}",
                    url, code
                )));
            }
            Err(e) => {
                return Err(Error::Download(format!("Failed to download {}: {}", url, e)));
            }
        };

        if response.status() != 200 {
            return Err(Error::Download(format!(
                "Failed to download {}: HTTP status {}",
                url,
                response.status()
            )));
        }

        let content_length = response
            .header("Content-Length")
            .and_then(|s| s.parse::<u64>().ok());

        if let Some(len) = content_length {
            info!("Downloading {} ...", format_file_size(len));
        }

        let mut file = fs::File::create(dest)
            .map_err(|e| Error::FileSystem(format!("Failed to create {}: {}", dest.display(), e)))?;

        let mut reader = response.into_reader();
        let mut buffer = [0u8; 8192];
        let mut total_bytes = 0u64;
        let mut next_report = 10 * 1024 * 1024;

        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .map_err(|e| Error::Download(format!("Failed to read download data: {}", e)))?;

            if bytes_read == 0 {
                break;
            }

            file.write_all(&buffer[..bytes_read])
                .map_err(|e| Error::FileSystem(format!("Failed to write {}: {}", dest.display(), e)))?;

            total_bytes += bytes_read as u64;

            if let Some(len) = content_length {
                if total_bytes >= next_report {
                    let percent = (total_bytes as f64 / len as f64) * 100.0;
                    debug!("Download progress: {:.1}%", percent);
                    next_report += 10 * 1024 * 1024;
                }
            }
        }

        file.flush()
            .map_err(|e| Error::FileSystem(format!("Failed to flush {}: {}", dest.display(), e)))?;

        Ok(total_bytes)
    }
}

/// Paths of the downloaded tokenizer files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizerFiles {
    pub config: PathBuf,
    pub data: PathBuf,
    pub special_tokens_map: PathBuf,
}

impl TokenizerFiles {
    /// Parse the config and data files into a vocabulary
    pub fn load_vocabulary(&self) -> Result<VocabularyStore> {
        VocabularyStore::from_files(&self.config, &self.data)
    }
}

/// Manages model downloading and storage
pub struct ModelManager<F = HttpFetcher> {
    base_dir: PathBuf,
    hub_url: String,
    tokenizer_repo: String,
    fetcher: F,
}

impl ModelManager<HttpFetcher> {
    /// Manager over the configured cache directory and hub
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            base_dir: config.cache_dir()?,
            hub_url: config.models.hub_url.clone(),
            tokenizer_repo: config.models.tokenizer_repo.clone(),
            fetcher: HttpFetcher,
        })
    }

    /// Manager with default hub settings rooted at `base_dir`
    pub fn with_base_dir(base_dir: impl AsRef<Path>) -> Self {
        let defaults = Config::default();
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            hub_url: defaults.models.hub_url,
            tokenizer_repo: defaults.models.tokenizer_repo,
            fetcher: HttpFetcher,
        }
    }
}

impl<F: BlobFetcher> ModelManager<F> {
    /// Swap the fetcher used for downloads
    pub fn with_fetcher<G: BlobFetcher>(self, fetcher: G) -> ModelManager<G> {
        ModelManager {
            base_dir: self.base_dir,
            hub_url: self.hub_url,
            tokenizer_repo: self.tokenizer_repo,
            fetcher,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Directory for one model repository
    pub fn model_dir(&self, model: &ModelOption) -> PathBuf {
        self.base_dir
            .join("models")
            .join(model.repo.replacen('/', "_", 1))
    }

    /// Local path of the model's ONNX file
    pub fn model_path(&self, model: &ModelOption) -> PathBuf {
        self.model_dir(model).join(model.file_name.replace('/', "_"))
    }

    pub fn tokenizer_dir(&self) -> PathBuf {
        self.base_dir.join("tokenizer")
    }

    pub fn tokenizer_files(&self) -> TokenizerFiles {
        let dir = self.tokenizer_dir();
        TokenizerFiles {
            config: dir.join(TOKENIZER_CONFIG_FILENAME),
            data: dir.join(TOKENIZER_FILENAME),
            special_tokens_map: dir.join(SPECIAL_TOKENS_MAP_FILENAME),
        }
    }

    fn tokenizer_url(&self, file_name: &str) -> String {
        format!(
            "{}/{}/resolve/main/{}",
            self.hub_url.trim_end_matches('/'),
            self.tokenizer_repo,
            file_name
        )
    }

    pub fn is_cached(&self, model: &ModelOption) -> bool {
        self.model_path(model).exists()
    }

    /// Size of the cached model file, if present
    pub fn cached_size(&self, model: &ModelOption) -> Option<u64> {
        fs::metadata(self.model_path(model)).ok().map(|m| m.len())
    }

    /// Download any tokenizer file not yet cached
    pub fn ensure_tokenizer_files(&self) -> Result<TokenizerFiles> {
        let dir = self.tokenizer_dir();
        fs::create_dir_all(&dir).map_err(|e| {
            Error::FileSystem(format!("Failed to create tokenizer directory: {}", e))
        })?;

        for file_name in TOKENIZER_FILES {
            let dest = dir.join(file_name);
            if dest.exists() {
                debug!("Using cached {}", file_name);
                continue;
            }
            info!("Downloading {}...", file_name);
            self.download(&self.tokenizer_url(file_name), &dest)?;
        }

        Ok(self.tokenizer_files())
    }

    /// Download the model file if it is not cached yet
    pub fn ensure_model(&self, model: &ModelOption) -> Result<PathBuf> {
        let path = self.model_path(model);
        if path.exists() {
            info!(
                "Using cached model ({})",
                format_file_size(self.cached_size(model).unwrap_or(0))
            );
            return Ok(path);
        }

        let dir = self.model_dir(model);
        fs::create_dir_all(&dir)
            .map_err(|e| Error::FileSystem(format!("Failed to create model directory: {}", e)))?;

        if model.is_large() {
            warn!("{}", model.size_warning());
        }

        info!("Model not cached, downloading {}", model.label);
        let bytes = self.download(&model.model_url(&self.hub_url), &path)?;
        info!("Model downloaded successfully ({})", format_file_size(bytes));
        Ok(path)
    }

    /// Fetch into a temporary sibling, then move into place
    fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let file_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = dest.with_file_name(format!("{}.tmp", file_name));

        let bytes = match self.fetcher.fetch(url, &temp_path) {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = fs::remove_file(&temp_path);
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&temp_path, dest) {
            let _ = fs::remove_file(&temp_path);
            return Err(Error::FileSystem(format!(
                "Failed to move {}: {}",
                dest.display(),
                e
            )));
        }

        debug!("Stored {} bytes at {:?}", bytes, dest);
        Ok(bytes)
    }
}
