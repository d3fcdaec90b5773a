//! Integration tests for the download, tokenize, embed and rank flow
//!
//! The default tests run against an in-memory blob store and a scripted
//! engine. Tests that talk to the model hub are ignored and can be run with:
//! cargo test -p embedprobe-embeddings --test integration -- --ignored

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use embedprobe_core::{Error, Result};
use embedprobe_embeddings::tensor::INPUT_IDS;
use embedprobe_embeddings::{
    find_model, BandingPolicy, BlobFetcher, EmbeddingPipeline, InferenceEngine, ModelInputs,
    ModelManager, ModelOutputs, RawModelOutput, ReferenceSet, Tokenizer,
};
use tempfile::TempDir;

const TOKENIZER_CONFIG: &str = r#"{
    "cls_token": "<s>",
    "sep_token": "</s>",
    "pad_token": {"content": "<pad>", "lstrip": false},
    "unk_token": "<unk>",
    "do_lower_case": false
}"#;

const TOKENIZER_DATA: &str = r#"{
    "version": "1.0",
    "model": {
        "type": "Unigram",
        "unk_id": 3,
        "vocab": [["<s>", 0.0], ["<pad>", 0.0], ["</s>", 0.0], ["<unk>", 0.0],
                  ["hello", -1.0], ["world", -2.0], ["wor", -3.0], ["ld", -3.0]]
    }
}"#;

/// Serves bodies keyed by the trailing path of the URL
struct InMemoryHub {
    files: HashMap<&'static str, &'static str>,
}

impl InMemoryHub {
    fn new() -> Self {
        let mut files = HashMap::new();
        files.insert("tokenizer_config.json", TOKENIZER_CONFIG);
        files.insert("tokenizer.json", TOKENIZER_DATA);
        files.insert("special_tokens_map.json", "{}");
        files.insert("paraphrase_multilingual_miniLM_L12_v2.onnx", "fake-onnx");
        Self { files }
    }
}

impl BlobFetcher for InMemoryHub {
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        let body = self
            .files
            .iter()
            .find(|(name, _)| url.ends_with(&format!("/resolve/main/{}", name)))
            .map(|(_, body)| *body)
            .ok_or_else(|| Error::Download(format!("Failed to download {}: HTTP status 404", url)))?;
        fs::write(dest, body)?;
        Ok(body.len() as u64)
    }
}

/// Counts ids 4, 5 and 3 (hello, world, unknown) into a pooled vector
struct CountingEngine;

impl InferenceEngine for CountingEngine {
    fn run(&mut self, inputs: &ModelInputs) -> Result<ModelOutputs> {
        let ids = &inputs.get(INPUT_IDS).unwrap().data;
        let count = |target: i64| ids.iter().filter(|&&id| id == target).count() as f32;
        let vector = vec![count(4), count(5), count(3)];
        Ok(ModelOutputs::new()
            .with("token_embeddings", RawModelOutput::new(vec![9.0; 3], vec![1, 1, 3]))
            .with("sentence_embedding", RawModelOutput::new(vector, vec![1, 3])))
    }
}

fn load_tokenizer(manager: &ModelManager<InMemoryHub>) -> Tokenizer {
    let files = manager.ensure_tokenizer_files().unwrap();
    Tokenizer::new(files.load_vocabulary().unwrap())
}

#[test]
fn test_download_then_tokenize() {
    let temp_dir = TempDir::new().unwrap();
    let manager = ModelManager::with_base_dir(temp_dir.path()).with_fetcher(InMemoryHub::new());
    let tokenizer = load_tokenizer(&manager);

    let tokenized = tokenizer.tokenize("hello world!", 8, false);
    assert_eq!(tokenized.input_ids, vec![0, 4, 5, 3, 2, 1, 1, 1]);
    assert_eq!(tokenized.attention_mask, vec![1, 1, 1, 1, 1, 0, 0, 0]);
    assert_eq!(
        tokenizer.tokens("helloworld", 5),
        vec!["<s>", "hello", "world", "</s>", "<pad>"]
    );
}

#[test]
fn test_model_download_is_cached() {
    let temp_dir = TempDir::new().unwrap();
    let manager = ModelManager::with_base_dir(temp_dir.path()).with_fetcher(InMemoryHub::new());
    let model = find_model("custom-minilm").unwrap();

    assert!(!manager.is_cached(model));
    let path = manager.ensure_model(model).unwrap();
    assert!(path.ends_with(
        "models/eldoon101_idk-parahrase-miniLM-onnxver/paraphrase_multilingual_miniLM_L12_v2.onnx"
    ));
    assert!(manager.is_cached(model));
    assert_eq!(manager.cached_size(model), Some(9));
}

#[test]
fn test_unknown_file_fails_download() {
    let temp_dir = TempDir::new().unwrap();
    let manager = ModelManager::with_base_dir(temp_dir.path()).with_fetcher(InMemoryHub::new());
    let model = find_model("official").unwrap();

    let err = manager.ensure_model(model).unwrap_err();
    assert!(matches!(err, Error::Download(_)));
    assert!(err.to_string().contains("onnx/model.onnx"));
    assert!(!manager.is_cached(model));
}

#[test]
fn test_pipeline_prefers_sentence_embedding() {
    let temp_dir = TempDir::new().unwrap();
    let manager = ModelManager::with_base_dir(temp_dir.path()).with_fetcher(InMemoryHub::new());
    let model = find_model("custom-minilm").unwrap();
    let mut pipeline = EmbeddingPipeline::for_model(model, load_tokenizer(&manager), CountingEngine);

    let embedding = pipeline.embed("hello hello world").unwrap();
    assert_eq!(embedding.output_name, "sentence_embedding");
    assert_eq!(embedding.vector, vec![2.0, 1.0, 0.0]);
    assert_eq!(pipeline.metrics().total_embeddings_generated(), 1);
}

#[test]
fn test_rank_against_references() {
    let temp_dir = TempDir::new().unwrap();
    let manager = ModelManager::with_base_dir(temp_dir.path()).with_fetcher(InMemoryHub::new());
    let model = find_model("custom-minilm").unwrap();
    let mut pipeline = EmbeddingPipeline::for_model(model, load_tokenizer(&manager), CountingEngine);

    let references_path = temp_dir.path().join("references.json");
    fs::write(
        &references_path,
        r#"[
            {"name": "greeting", "vector": [1.0, 0.0, 0.0]},
            {"name": "opposite", "vector": [-1.0, -1.0, -1.0]},
            {"name": "mixed", "vector": [1.0, 1.0, 1.0]}
        ]"#,
    )
    .unwrap();
    let references = ReferenceSet::from_file(&references_path).unwrap();

    let query = pipeline.embed("hello world!").unwrap();
    let ranked = references.rank(&query.vector, BandingPolicy::Coarse);
    let names: Vec<&str> = ranked.iter().map(|m| m.name).collect();
    assert_eq!(names, vec!["mixed", "greeting", "opposite"]);

    assert_eq!(ranked[0].result.score, 1.0);
    assert_eq!(ranked[0].result.label, "very similar");
    assert!((ranked[1].result.score - 0.57735).abs() < 1e-4);
    assert_eq!(ranked[1].result.label, "moderately similar");
    assert_eq!(ranked[2].result.label, "not similar");

    let detailed = references.rank(&query.vector, BandingPolicy::Detailed);
    assert_eq!(detailed[1].result.label, "moderate");
}

/// Test that the real tokenizer files download and parse
#[test]
#[ignore = "Requires network access to the model hub"]
fn test_real_tokenizer_download() {
    let temp_dir = TempDir::new().unwrap();
    let manager = ModelManager::with_base_dir(temp_dir.path());
    let files = manager
        .ensure_tokenizer_files()
        .expect("Failed to download tokenizer files");
    let tokenizer = Tokenizer::new(files.load_vocabulary().expect("Failed to parse vocabulary"));

    assert!(tokenizer.vocab().len() > 100_000);
    let tokenized = tokenizer.tokenize("Hello world", 12, true);
    assert_eq!(tokenized.len(), 12);
    assert_eq!(tokenized.token_type_ids, Some(vec![0; 12]));
    assert!(tokenized.real_tokens() >= 3);
}

/// Test end-to-end inference with the standard ONNX export
#[cfg(feature = "onnx")]
#[test]
#[ignore = "Requires downloading the model (~470MB for optimized variants, less for official)"]
fn test_real_model_embedding() {
    use embedprobe_core::InferenceConfig;
    use embedprobe_embeddings::OrtEngine;

    let temp_dir = TempDir::new().unwrap();
    let manager = ModelManager::with_base_dir(temp_dir.path());
    let model = find_model("official").unwrap();

    let files = manager.ensure_tokenizer_files().expect("tokenizer download");
    let model_path = manager.ensure_model(model).expect("model download");
    let engine = OrtEngine::from_file(&model_path, &InferenceConfig::default()).expect("load model");
    let tokenizer = Tokenizer::new(files.load_vocabulary().expect("vocabulary"));
    let mut pipeline = EmbeddingPipeline::for_model(model, tokenizer, engine);

    let embedding = pipeline.embed("The weather is lovely today").expect("embed");
    assert_eq!(embedding.dimensions(), 384);

    let result = pipeline
        .compare("Good morning", "Good morning", BandingPolicy::Detailed)
        .expect("compare");
    assert_eq!(result.score, 1.0);
}
