//! embedprobe embeddings - Tokenization and embedding comparison
//!
//! This crate turns text into fixed-length model inputs, reduces raw model
//! outputs to a single embedding vector, and scores vectors against each
//! other. Model files are downloaded and cached by [`ModelManager`]; ONNX
//! Runtime inference is available behind the `onnx` feature.

pub mod extract;
pub mod inference;
pub mod model;
pub mod similarity;
pub mod tensor;
pub mod tokenizer;
pub mod vocab;

pub use extract::{extract, extract_from, select_output};
pub use inference::{Embedding, EmbeddingMetrics, EmbeddingPipeline, InferenceEngine, MetricsSnapshot};
#[cfg(feature = "onnx")]
pub use inference::OrtEngine;
pub use model::{catalog, find_model, format_file_size, BlobFetcher, HttpFetcher, ModelManager, ModelOption, TokenizerFiles};
pub use similarity::{compare, cosine_similarity, BandingPolicy, ReferenceSet, SimilarityResult};
pub use tensor::{ModelInputs, ModelOutputs, RawModelOutput};
pub use tokenizer::{TokenizedInput, Tokenizer};
pub use vocab::VocabularyStore;
