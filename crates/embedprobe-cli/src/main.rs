//! embedprobe - Try sentence-embedding models from the terminal
//!
//! Downloads a model and its tokenizer, tokenizes text, runs inference,
//! and compares the resulting embeddings by cosine similarity.

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context};
use tracing_subscriber::EnvFilter;

use embedprobe_core::Config;
use embedprobe_embeddings::similarity::preview;
use embedprobe_embeddings::{
    catalog, find_model, format_file_size, BandingPolicy, EmbeddingPipeline, ModelManager,
    ModelOption, ReferenceSet, Tokenizer,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Values shown by `embed`
const PREVIEW_VALUES: usize = 5;

#[cfg(feature = "onnx")]
type Engine = embedprobe_embeddings::OrtEngine;
#[cfg(not(feature = "onnx"))]
type Engine = Box<dyn embedprobe_embeddings::InferenceEngine>;

fn print_help() {
    eprintln!(
        r#"embedprobe v{VERSION} - Try sentence-embedding models from the terminal

USAGE:
    embedprobe [OPTIONS] <COMMAND> [ARGS]

COMMANDS:
    models                      List available models and their cache state
    fetch                       Download the tokenizer and model files
    tokenize <TEXT>             Show tokens, ids and attention mask
    embed <TEXT>                Generate an embedding (requires onnx)
    compare <TEXT_A> <TEXT_B>   Cosine similarity of two texts (requires onnx)
    rank <TEXT>                 Score text against reference embeddings (requires onnx)
    version                     Print version information

OPTIONS:
    -h, --help                  Print this help message
    -v, --version               Print version
    -m, --model <ID>            Model id (default: models.default_model)
    --max-length <N>            Override the model's sequence length for tokenize
    --policy <detailed|coarse>  Similarity labels (default: similarity.policy)
    --references <FILE>         JSON file of [{{"name": ..., "vector": [...]}}] for rank
    --config <FILE>             Use this config file instead of the default search

ENVIRONMENT:
    RUST_LOG                    Log level (default: logging.level, then info)

EXAMPLES:
    # See which models are cached
    embedprobe models

    # Download the quantized model ahead of time
    embedprobe fetch --model quint8-avx2

    # Compare two sentences
    embedprobe compare "The cat sits outside" "A cat is sitting outdoors"
"#
    );
}

fn print_version() {
    println!("embedprobe {}", VERSION);
}

/// Parsed command line
#[derive(Debug, Default)]
struct Args {
    command: Option<String>,
    model: Option<String>,
    max_length: Option<usize>,
    policy: Option<String>,
    references: Option<PathBuf>,
    config: Option<PathBuf>,
    positional: Vec<String>,
}

fn option_value(args: &[String], i: &mut usize, flag: &str) -> String {
    *i += 1;
    match args.get(*i) {
        Some(value) => value.clone(),
        None => {
            eprintln!("Error: {} requires a value", flag);
            std::process::exit(1);
        }
    }
}

fn parse_args(args: &[String]) -> Args {
    let mut parsed = Args::default();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "-m" | "--model" => parsed.model = Some(option_value(args, &mut i, "--model")),
            "--max-length" => {
                let value = option_value(args, &mut i, "--max-length");
                match value.parse() {
                    Ok(n) => parsed.max_length = Some(n),
                    Err(_) => {
                        eprintln!("Error: --max-length expects a number, got '{}'", value);
                        std::process::exit(1);
                    }
                }
            }
            "--policy" => parsed.policy = Some(option_value(args, &mut i, "--policy")),
            "--references" => {
                parsed.references = Some(PathBuf::from(option_value(args, &mut i, "--references")))
            }
            "--config" => parsed.config = Some(PathBuf::from(option_value(args, &mut i, "--config"))),
            arg if arg.starts_with('-') && arg.len() > 1 => {
                eprintln!("Unknown option: {}", arg);
                eprintln!("Run 'embedprobe --help' for usage");
                std::process::exit(1);
            }
            arg => {
                if parsed.command.is_none() {
                    parsed.command = Some(arg.to_string());
                } else {
                    parsed.positional.push(arg.to_string());
                }
            }
        }
        i += 1;
    }

    parsed
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    Ok(config)
}

fn selected_model(args: &Args, config: &Config) -> anyhow::Result<&'static ModelOption> {
    let id = args.model.as_deref().unwrap_or(&config.models.default_model);
    Ok(find_model(id)?)
}

fn selected_policy(args: &Args, config: &Config) -> anyhow::Result<BandingPolicy> {
    match args.policy.as_deref() {
        Some(name) => Ok(BandingPolicy::from_str(name)?),
        None => Ok(config.similarity.policy),
    }
}

fn text_argument(args: &Args, command: &str) -> anyhow::Result<String> {
    if args.positional.is_empty() {
        bail!("'{}' needs text to work on", command);
    }
    Ok(args.positional.join(" "))
}

fn list_models(config: &Config) -> anyhow::Result<()> {
    let manager = ModelManager::from_config(config)?;
    println!("Cache directory: {}", manager.base_dir().display());
    println!();

    for model in catalog() {
        let marker = if model.id == config.models.default_model { "*" } else { " " };
        let cached = match manager.cached_size(model) {
            Some(size) => format!("cached, {}", format_file_size(size)),
            None if model.is_large() => "not cached, ~470 MB".to_string(),
            None => "not cached".to_string(),
        };
        println!("{} {:<14} {} [{}]", marker, model.id, model.label, cached);
        println!("  {:<14} {}", "", model.description);
    }
    Ok(())
}

fn fetch(config: &Config, model: &ModelOption) -> anyhow::Result<()> {
    let manager = ModelManager::from_config(config)?;
    if model.is_large() && !manager.is_cached(model) {
        eprintln!("Warning: {}", model.size_warning());
    }

    let files = manager
        .ensure_tokenizer_files()
        .context("Failed to download tokenizer files")?;
    println!("Tokenizer: {}", files.data.parent().unwrap_or(&files.data).display());

    let path = manager
        .ensure_model(model)
        .with_context(|| format!("Failed to download model '{}'", model.id))?;
    let size = manager.cached_size(model).unwrap_or(0);
    println!("Model:     {} ({})", path.display(), format_file_size(size));
    Ok(())
}

fn load_tokenizer(manager: &ModelManager) -> anyhow::Result<Tokenizer> {
    let files = manager
        .ensure_tokenizer_files()
        .context("Failed to download tokenizer files")?;
    let vocab = files.load_vocabulary().map_err(|e| {
        if e.is_config() {
            anyhow::anyhow!(
                "Tokenizer files in {} are malformed ({}); delete them to download again",
                manager.tokenizer_dir().display(),
                e
            )
        } else {
            e.into()
        }
    })?;
    Ok(Tokenizer::new(vocab))
}

fn tokenize(config: &Config, model: &ModelOption, max_length: Option<usize>, text: &str) -> anyhow::Result<()> {
    let manager = ModelManager::from_config(config)?;
    let tokenizer = load_tokenizer(&manager)?;
    let max_length = max_length.unwrap_or(model.max_length);

    let tokenized = tokenizer.tokenize(text, max_length, model.needs_token_type_ids);
    let tokens = tokenizer.tokens(text, max_length);

    println!("Tokens:         {:?}", tokens);
    println!("Input ids:      {:?}", tokenized.input_ids);
    println!("Attention mask: {:?}", tokenized.attention_mask);
    if let Some(ref type_ids) = tokenized.token_type_ids {
        println!("Token types:    {:?}", type_ids);
    }
    println!(
        "Real tokens:    {} of {}",
        tokenized.real_tokens(),
        tokenized.len()
    );
    Ok(())
}

#[cfg(feature = "onnx")]
fn load_engine(path: &Path, config: &Config) -> anyhow::Result<Engine> {
    Ok(embedprobe_embeddings::OrtEngine::from_file(path, &config.inference)?)
}

#[cfg(not(feature = "onnx"))]
fn load_engine(_path: &Path, _config: &Config) -> anyhow::Result<Engine> {
    bail!("embedprobe was built without ONNX Runtime support; rebuild with --features onnx")
}

fn load_pipeline(config: &Config, model: &ModelOption) -> anyhow::Result<EmbeddingPipeline<Engine>> {
    if !cfg!(feature = "onnx") {
        bail!("Inference needs ONNX Runtime support; rebuild with --features onnx");
    }

    let manager = ModelManager::from_config(config)?;
    if model.is_large() && !manager.is_cached(model) {
        eprintln!("Warning: {}", model.size_warning());
    }

    let tokenizer = load_tokenizer(&manager)?;
    let path = manager
        .ensure_model(model)
        .with_context(|| format!("Failed to download model '{}'", model.id))?;
    let engine = load_engine(&path, config)?;

    tracing::info!("Loaded model '{}'", model.id);
    Ok(EmbeddingPipeline::for_model(model, tokenizer, engine))
}

fn embed(config: &Config, model: &ModelOption, text: &str) -> anyhow::Result<()> {
    let mut pipeline = load_pipeline(config, model)?;
    let embedding = pipeline.embed(text)?;

    println!("Model:          {}", model.label);
    println!("Output:         {}", embedding.output_name);
    println!("Dimensions:     {}", embedding.dimensions());
    println!("Preview:        {}", preview(&embedding.vector, PREVIEW_VALUES));
    println!(
        "Inference time: {:.1}ms",
        embedding.inference_time.as_secs_f64() * 1000.0
    );
    Ok(())
}

fn compare(
    config: &Config,
    model: &ModelOption,
    policy: BandingPolicy,
    a: &str,
    b: &str,
) -> anyhow::Result<()> {
    let mut pipeline = load_pipeline(config, model)?;
    let result = pipeline.compare(a, b, policy)?;

    println!("Similarity: {}", result);
    tracing::debug!("{}", pipeline.metrics().snapshot());
    Ok(())
}

fn rank(
    config: &Config,
    model: &ModelOption,
    policy: BandingPolicy,
    references: &Path,
    text: &str,
) -> anyhow::Result<()> {
    let references = ReferenceSet::from_file(references)
        .with_context(|| format!("Failed to load references from {}", references.display()))?;
    if references.is_empty() {
        bail!("Reference file contains no embeddings");
    }

    let mut pipeline = load_pipeline(config, model)?;
    let query = pipeline.embed(text)?;

    let width = references
        .entries()
        .iter()
        .map(|entry| entry.name.chars().count())
        .max()
        .unwrap_or(0);

    for (position, matched) in references.rank(&query.vector, policy).iter().enumerate() {
        println!(
            "{:>3}. {:<width$}  {}",
            position + 1,
            matched.name,
            matched.result,
            width = width
        );
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let raw_args: Vec<String> = env::args().collect();
    let args = parse_args(&raw_args);

    let command = match args.command.as_deref() {
        Some(command) => command,
        None => {
            print_help();
            std::process::exit(1);
        }
    };

    if command == "version" {
        print_version();
        return Ok(());
    }

    let config = load_config(args.config.as_deref())?;

    // Logs go to stderr so command output stays pipeable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.to_lowercase())),
        )
        .with_writer(std::io::stderr)
        .init();

    match command {
        "models" => list_models(&config),
        "fetch" => fetch(&config, selected_model(&args, &config)?),
        "tokenize" => {
            let text = text_argument(&args, command)?;
            tokenize(&config, selected_model(&args, &config)?, args.max_length, &text)
        }
        "embed" => {
            let text = text_argument(&args, command)?;
            embed(&config, selected_model(&args, &config)?, &text)
        }
        "compare" => {
            let [a, b] = args.positional.as_slice() else {
                bail!("'compare' needs exactly two texts; quote multi-word sentences");
            };
            let policy = selected_policy(&args, &config)?;
            compare(&config, selected_model(&args, &config)?, policy, a, b)
        }
        "rank" => {
            let references = args
                .references
                .as_deref()
                .context("'rank' needs --references <FILE>")?;
            let text = text_argument(&args, command)?;
            let policy = selected_policy(&args, &config)?;
            rank(&config, selected_model(&args, &config)?, policy, references, &text)
        }
        other => {
            eprintln!("Unknown command: {}", other);
            eprintln!("Run 'embedprobe --help' for usage");
            std::process::exit(1);
        }
    }
}
