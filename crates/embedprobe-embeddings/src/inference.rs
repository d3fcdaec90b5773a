//! Inference engine boundary and the text-to-embedding pipeline

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use embedprobe_core::{Error, Result};

use crate::extract::{extract, select_output};
use crate::model::ModelOption;
use crate::similarity::{compare, BandingPolicy, SimilarityResult};
use crate::tensor::{ModelInputs, ModelOutputs};
use crate::tokenizer::{TokenizedInput, Tokenizer};

/// Something that maps named integer tensors to named float tensors
pub trait InferenceEngine {
    fn run(&mut self, inputs: &ModelInputs) -> Result<ModelOutputs>;
}

impl<E: InferenceEngine + ?Sized> InferenceEngine for Box<E> {
    fn run(&mut self, inputs: &ModelInputs) -> Result<ModelOutputs> {
        (**self).run(inputs)
    }
}

/// Thread-safe metrics for embedding performance tracking
#[derive(Debug, Default)]
pub struct EmbeddingMetrics {
    /// Total number of embeddings generated
    total_embeddings: AtomicU64,
    /// Total engine time in microseconds
    total_inference_time_us: AtomicU64,
    /// Engine calls or extractions that failed
    failed_embeddings: AtomicU64,
}

impl EmbeddingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed embedding operation
    pub fn record_embedding(&self, inference_time: Duration) {
        self.total_embeddings.fetch_add(1, Ordering::Relaxed);
        self.total_inference_time_us
            .fetch_add(inference_time.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed_embeddings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_embeddings_generated(&self) -> u64 {
        self.total_embeddings.load(Ordering::Relaxed)
    }

    pub fn failed_embeddings(&self) -> u64 {
        self.failed_embeddings.load(Ordering::Relaxed)
    }

    pub fn total_inference_time(&self) -> Duration {
        Duration::from_micros(self.total_inference_time_us.load(Ordering::Relaxed))
    }

    /// Mean engine time per successful embedding
    pub fn average_latency(&self) -> Duration {
        let count = self.total_embeddings_generated();
        if count > 0 {
            Duration::from_micros(self.total_inference_time_us.load(Ordering::Relaxed) / count)
        } else {
            Duration::ZERO
        }
    }

    /// Reset all metrics to zero
    pub fn reset(&self) {
        self.total_embeddings.store(0, Ordering::Relaxed);
        self.total_inference_time_us.store(0, Ordering::Relaxed);
        self.failed_embeddings.store(0, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_embeddings_generated: self.total_embeddings_generated(),
            failed_embeddings: self.failed_embeddings(),
            total_inference_time: self.total_inference_time(),
            average_latency: self.average_latency(),
        }
    }
}

/// A point-in-time snapshot of embedding metrics
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub total_embeddings_generated: u64,
    pub failed_embeddings: u64,
    pub total_inference_time: Duration,
    pub average_latency: Duration,
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Embeddings: {}, Failed: {}, Total time: {:.2}s, Avg latency: {:.1}ms",
            self.total_embeddings_generated,
            self.failed_embeddings,
            self.total_inference_time.as_secs_f64(),
            self.average_latency.as_secs_f64() * 1000.0
        )
    }
}

/// One embedded text
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    /// Engine output the vector was taken from
    pub output_name: String,
    /// Time spent inside the engine
    pub inference_time: Duration,
}

impl Embedding {
    pub fn dimensions(&self) -> usize {
        self.vector.len()
    }
}

/// Tokenizer, engine and model settings wired into one text-to-vector step
pub struct EmbeddingPipeline<E> {
    tokenizer: Tokenizer,
    engine: E,
    max_length: usize,
    needs_token_type_ids: bool,
    metrics: EmbeddingMetrics,
}

impl<E> std::fmt::Debug for EmbeddingPipeline<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingPipeline")
            .field("tokenizer", &self.tokenizer)
            .field("max_length", &self.max_length)
            .field("needs_token_type_ids", &self.needs_token_type_ids)
            .finish_non_exhaustive()
    }
}

impl<E: InferenceEngine> EmbeddingPipeline<E> {
    pub fn new(
        tokenizer: Tokenizer,
        engine: E,
        max_length: usize,
        needs_token_type_ids: bool,
    ) -> Self {
        Self {
            tokenizer,
            engine,
            max_length,
            needs_token_type_ids,
            metrics: EmbeddingMetrics::new(),
        }
    }

    /// Pipeline using a catalog entry's sequence length and inputs
    pub fn for_model(model: &ModelOption, tokenizer: Tokenizer, engine: E) -> Self {
        Self::new(
            tokenizer,
            engine,
            model.max_length,
            model.needs_token_type_ids,
        )
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn metrics(&self) -> &EmbeddingMetrics {
        &self.metrics
    }

    /// Tokenize with this pipeline's settings
    pub fn tokenize(&self, text: &str) -> TokenizedInput {
        self.tokenizer
            .tokenize(text, self.max_length, self.needs_token_type_ids)
    }

    /// Generate an embedding for a single text
    pub fn embed(&mut self, text: &str) -> Result<Embedding> {
        let result = self.embed_internal(text);
        if result.is_err() {
            self.metrics.record_failure();
        }
        result
    }

    fn embed_internal(&mut self, text: &str) -> Result<Embedding> {
        let tokenized = self.tokenize(text);
        debug!(
            "Embedding text with {} real tokens of {}",
            tokenized.real_tokens(),
            tokenized.len()
        );
        let inputs = ModelInputs::from_tokenized(&tokenized);

        let start = Instant::now();
        let outputs = self.engine.run(&inputs)?;
        let inference_time = start.elapsed();

        let (output_name, output) = select_output(&outputs)?;
        let vector = extract(output)?;
        if vector.is_empty() {
            return Err(Error::Embedding(format!(
                "Output '{}' produced an empty embedding",
                output_name
            )));
        }

        self.metrics.record_embedding(inference_time);
        info!(
            "Generated {}-dimensional embedding in {:.1}ms",
            vector.len(),
            inference_time.as_secs_f64() * 1000.0
        );

        Ok(Embedding {
            vector,
            output_name: output_name.to_string(),
            inference_time,
        })
    }

    /// Embed each text in turn, stopping at the first failure
    pub fn embed_batch(&mut self, texts: &[&str]) -> Result<Vec<Embedding>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    /// Embed two texts and score them against each other
    pub fn compare(&mut self, a: &str, b: &str, policy: BandingPolicy) -> Result<SimilarityResult> {
        let first = self.embed(a)?;
        let second = self.embed(b)?;
        Ok(compare(&first.vector, &second.vector, policy))
    }
}

#[cfg(feature = "onnx")]
pub use self::onnx::OrtEngine;

#[cfg(feature = "onnx")]
mod onnx {
    use std::path::Path;

    use ort::session::{builder::GraphOptimizationLevel, Session};
    use ort::value::{DynValue, Tensor};
    use tracing::{debug, info, warn};

    use embedprobe_core::{Error, InferenceConfig, Result};

    use super::InferenceEngine;
    use crate::tensor::{ModelInputs, ModelOutputs, RawModelOutput};

    /// ONNX Runtime session behind the engine boundary
    pub struct OrtEngine {
        session: Session,
    }

    impl std::fmt::Debug for OrtEngine {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("OrtEngine").finish_non_exhaustive()
        }
    }

    impl OrtEngine {
        /// Load an ONNX model file
        pub fn from_file(path: impl AsRef<Path>, config: &InferenceConfig) -> Result<Self> {
            let path = path.as_ref();
            if !path.exists() {
                return Err(Error::Embedding(format!(
                    "Model file not found: {}",
                    path.display()
                )));
            }

            info!("Loading ONNX model from {}", path.display());

            let level = match config.optimization_level {
                0 => GraphOptimizationLevel::Disable,
                1 => GraphOptimizationLevel::Level1,
                2 => GraphOptimizationLevel::Level2,
                _ => GraphOptimizationLevel::Level3,
            };

            let session = Session::builder()
                .map_err(|e| Error::Embedding(format!("Failed to create session builder: {}", e)))?
                .with_optimization_level(level)
                .map_err(|e| Error::Embedding(format!("Failed to set optimization level: {}", e)))?
                .with_intra_threads(config.intra_threads)
                .map_err(|e| Error::Embedding(format!("Failed to set thread count: {}", e)))?
                .commit_from_file(path)
                .map_err(|e| Error::Embedding(format!("Failed to load ONNX model: {}", e)))?;

            debug!("ONNX model loaded successfully");
            Ok(Self { session })
        }
    }

    impl InferenceEngine for OrtEngine {
        fn run(&mut self, inputs: &ModelInputs) -> Result<ModelOutputs> {
            let mut feeds: Vec<(String, DynValue)> = Vec::with_capacity(inputs.len());
            for (name, tensor) in inputs.iter() {
                let value = Tensor::from_array((tensor.shape, tensor.data.clone()))
                    .map_err(|e| {
                        Error::Embedding(format!("Failed to create {} tensor: {}", name, e))
                    })?;
                feeds.push((name.to_string(), value.into_dyn()));
            }

            let outputs = self
                .session
                .run(feeds)
                .map_err(|e| Error::Embedding(format!("ONNX inference failed: {}", e)))?;

            let mut converted = ModelOutputs::new();
            for (name, value) in outputs.iter() {
                match value.try_extract_tensor::<f32>() {
                    Ok((shape, data)) => {
                        let dims = shape.iter().map(|&d| d.max(0) as usize).collect();
                        converted.push(name, RawModelOutput::new(data.to_vec(), dims));
                    }
                    Err(e) => warn!("Skipping non-float output '{}': {}", name, e),
                }
            }

            Ok(converted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{RawModelOutput, INPUT_IDS, TOKEN_TYPE_IDS};
    use crate::vocab::VocabularyStore;

    fn tokenizer() -> Tokenizer {
        let vocab = VocabularyStore::from_json(
            r#"{"do_lower_case": true}"#,
            r#"{"model": {"vocab": {"[PAD]": 0, "hello": 1, "world": 2, "[UNK]": 3, "[CLS]": 4, "[SEP]": 5}}}"#,
        )
        .unwrap();
        Tokenizer::new(vocab)
    }

    /// Returns the input ids as a `[1, seq_len, 1]` hidden state
    struct EchoEngine {
        calls: usize,
        seen: Vec<ModelInputs>,
    }

    impl EchoEngine {
        fn new() -> Self {
            Self {
                calls: 0,
                seen: Vec::new(),
            }
        }
    }

    impl InferenceEngine for EchoEngine {
        fn run(&mut self, inputs: &ModelInputs) -> Result<ModelOutputs> {
            self.calls += 1;
            self.seen.push(inputs.clone());
            let ids = inputs.get(INPUT_IDS).unwrap();
            let data: Vec<f32> = ids.data.iter().map(|&id| id as f32 + 1.0).collect();
            let len = data.len();
            Ok(ModelOutputs::new().with("last_hidden_state", RawModelOutput::new(data, vec![1, len, 1])))
        }
    }

    struct FailingEngine;

    impl InferenceEngine for FailingEngine {
        fn run(&mut self, _inputs: &ModelInputs) -> Result<ModelOutputs> {
            Err(Error::Embedding("engine exploded".into()))
        }
    }

    #[test]
    fn test_embed_uses_position_zero() {
        let mut pipeline = EmbeddingPipeline::new(tokenizer(), EchoEngine::new(), 6, false);
        let embedding = pipeline.embed("Hello world").unwrap();

        // [CLS] id 4 becomes 5.0
        assert_eq!(embedding.vector, vec![5.0]);
        assert_eq!(embedding.output_name, "last_hidden_state");
        assert_eq!(embedding.dimensions(), 1);

        let seen = &pipeline.engine.seen[0];
        assert_eq!(seen.get(INPUT_IDS).unwrap().data, vec![4, 1, 2, 5, 0, 0]);
        assert!(seen.get(TOKEN_TYPE_IDS).is_none());
    }

    #[test]
    fn test_for_model_passes_token_type_ids() {
        let model = crate::model::find_model("official").unwrap();
        let mut pipeline = EmbeddingPipeline::for_model(model, tokenizer(), EchoEngine::new());
        assert_eq!(pipeline.max_length(), 12);

        pipeline.embed("hello").unwrap();
        let seen = &pipeline.engine.seen[0];
        assert_eq!(seen.get(TOKEN_TYPE_IDS).unwrap().data, vec![0; 12]);
        assert_eq!(seen.get(INPUT_IDS).unwrap().shape, [1, 12]);
    }

    #[test]
    fn test_metrics_record_success_and_failure() {
        let mut pipeline = EmbeddingPipeline::new(tokenizer(), EchoEngine::new(), 4, false);
        pipeline.embed("hello").unwrap();
        pipeline.embed("world").unwrap();

        let snapshot = pipeline.metrics().snapshot();
        assert_eq!(snapshot.total_embeddings_generated, 2);
        assert_eq!(snapshot.failed_embeddings, 0);

        let mut failing = EmbeddingPipeline::new(tokenizer(), FailingEngine, 4, false);
        let err = failing.embed("hello").unwrap_err();
        assert!(err.to_string().contains("engine exploded"));
        assert_eq!(failing.metrics().total_embeddings_generated(), 0);
        assert_eq!(failing.metrics().failed_embeddings(), 1);
    }

    #[test]
    fn test_missing_output_is_failure() {
        struct SilentEngine;
        impl InferenceEngine for SilentEngine {
            fn run(&mut self, _inputs: &ModelInputs) -> Result<ModelOutputs> {
                Ok(ModelOutputs::new())
            }
        }

        let mut pipeline = EmbeddingPipeline::new(tokenizer(), SilentEngine, 4, false);
        assert!(matches!(pipeline.embed("hello"), Err(Error::MissingOutput(_))));
        assert_eq!(pipeline.metrics().failed_embeddings(), 1);
    }

    #[test]
    fn test_embed_batch_and_compare() {
        let mut pipeline = EmbeddingPipeline::new(tokenizer(), EchoEngine::new(), 4, false);
        let embeddings = pipeline.embed_batch(&["hello", "world", "other"]).unwrap();
        assert_eq!(embeddings.len(), 3);
        assert_eq!(pipeline.engine.calls, 3);

        let result = pipeline
            .compare("hello", "world", BandingPolicy::Detailed)
            .unwrap();
        assert_eq!(result.score, 1.0);
        assert_eq!(result.label, "very high");
    }

    #[test]
    fn test_boxed_engine() {
        let engine: Box<dyn InferenceEngine> = Box::new(EchoEngine::new());
        let mut pipeline = EmbeddingPipeline::new(tokenizer(), engine, 4, false);
        assert!(pipeline.embed("hello").is_ok());
    }

    #[test]
    fn test_metrics_average_and_reset() {
        let metrics = EmbeddingMetrics::new();
        assert_eq!(metrics.average_latency(), Duration::ZERO);

        metrics.record_embedding(Duration::from_millis(10));
        metrics.record_embedding(Duration::from_millis(30));
        assert_eq!(metrics.average_latency(), Duration::from_millis(20));
        assert_eq!(metrics.total_inference_time(), Duration::from_millis(40));

        let display = metrics.snapshot().to_string();
        assert!(display.contains("Embeddings: 2"));
        assert!(display.contains("Avg latency: 20.0ms"));

        metrics.reset();
        assert_eq!(metrics.total_embeddings_generated(), 0);
    }

    #[test]
    fn test_average_latency_past_u32_count() {
        let metrics = EmbeddingMetrics::new();
        metrics.total_embeddings.store(1u64 << 32, Ordering::Relaxed);
        metrics
            .total_inference_time_us
            .store(3 * (1u64 << 32), Ordering::Relaxed);
        assert_eq!(metrics.average_latency(), Duration::from_micros(3));
    }
}
