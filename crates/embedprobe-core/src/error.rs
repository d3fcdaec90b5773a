//! Error types for embedprobe

use thiserror::Error;

/// Main error type for embedprobe operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No output tensor found: {0}")]
    MissingOutput(String),

    #[error("Unsupported output shape {0:?}: expected [1, hidden] or [1, seq_len, hidden]")]
    UnsupportedShape(Vec<usize>),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type alias for embedprobe operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the error came from a malformed tokenizer or settings document
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_) | Error::Serialization(_) | Error::Toml(_))
    }
}
