//! Vocabulary store loaded from tokenizer documents
//!
//! Two documents feed the store: the behavior config (`tokenizer_config.json`)
//! and the tokenizer data (`tokenizer.json`). Both are parsed into typed
//! structures up front; the resulting store is immutable.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use embedprobe_core::{Error, Result};

pub const DEFAULT_UNK_TOKEN: &str = "[UNK]";
pub const DEFAULT_PAD_TOKEN: &str = "[PAD]";
pub const DEFAULT_CLS_TOKEN: &str = "[CLS]";
pub const DEFAULT_SEP_TOKEN: &str = "[SEP]";

/// A special token as written in `tokenizer_config.json`
///
/// Older configs store the bare string, newer ones an added-token object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SpecialToken {
    Plain(String),
    Added { content: String },
}

impl SpecialToken {
    fn into_content(self) -> String {
        match self {
            SpecialToken::Plain(s) => s,
            SpecialToken::Added { content } => content,
        }
    }
}

/// Tokenizer behavior config (`tokenizer_config.json`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenizerSettings {
    #[serde(default)]
    pub unk_token: Option<SpecialToken>,
    #[serde(default)]
    pub pad_token: Option<SpecialToken>,
    #[serde(default)]
    pub cls_token: Option<SpecialToken>,
    #[serde(default)]
    pub sep_token: Option<SpecialToken>,
    #[serde(default)]
    pub do_lower_case: Option<bool>,
}

/// Tokenizer data document (`tokenizer.json`); only `model.vocab` is read
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenizerData {
    #[serde(default)]
    pub model: Option<TokenizerModel>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenizerModel {
    #[serde(default)]
    pub vocab: Option<VocabSection>,
}

/// The `model.vocab` field
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum VocabSection {
    /// WordPiece / WordLevel: token -> id
    Map(HashMap<String, u32>),
    /// Unigram: `[piece, score]` pairs, id is the position
    Pieces(Vec<(String, f64)>),
}

impl VocabSection {
    fn into_map(self) -> HashMap<String, u32> {
        match self {
            VocabSection::Map(map) => map,
            VocabSection::Pieces(pieces) => {
                let mut map = HashMap::with_capacity(pieces.len());
                for (id, (piece, _score)) in pieces.into_iter().enumerate() {
                    // first occurrence wins so ids stay stable
                    map.entry(piece).or_insert(id as u32);
                }
                map
            }
        }
    }
}

/// Immutable token -> id mapping plus special tokens and case folding
#[derive(Clone)]
pub struct VocabularyStore {
    token_to_id: HashMap<String, u32>,
    unk_token: String,
    pad_token: String,
    cls_token: String,
    sep_token: String,
    lowercase: bool,
    longest_token_chars: usize,
}

impl fmt::Debug for VocabularyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VocabularyStore")
            .field("size", &self.token_to_id.len())
            .field("unk_token", &self.unk_token)
            .field("pad_token", &self.pad_token)
            .field("cls_token", &self.cls_token)
            .field("sep_token", &self.sep_token)
            .field("lowercase", &self.lowercase)
            .finish_non_exhaustive()
    }
}

impl VocabularyStore {
    /// Build the store from the two parsed documents
    ///
    /// Fails with `Error::Config` if `model.vocab` is absent or empty.
    pub fn load(settings: TokenizerSettings, data: TokenizerData) -> Result<Self> {
        let token_to_id = data
            .model
            .and_then(|m| m.vocab)
            .map(VocabSection::into_map)
            .unwrap_or_default();

        if token_to_id.is_empty() {
            return Err(Error::Config(
                "Tokenizer data has no model.vocab entries".into(),
            ));
        }

        let pick = |token: Option<SpecialToken>, default: &str| {
            token
                .map(SpecialToken::into_content)
                .unwrap_or_else(|| default.to_string())
        };

        let longest_token_chars = token_to_id
            .keys()
            .map(|t| t.chars().count())
            .max()
            .unwrap_or(0);

        let store = Self {
            unk_token: pick(settings.unk_token, DEFAULT_UNK_TOKEN),
            pad_token: pick(settings.pad_token, DEFAULT_PAD_TOKEN),
            cls_token: pick(settings.cls_token, DEFAULT_CLS_TOKEN),
            sep_token: pick(settings.sep_token, DEFAULT_SEP_TOKEN),
            lowercase: settings.do_lower_case.unwrap_or(false),
            token_to_id,
            longest_token_chars,
        };

        debug!(
            "Loaded vocabulary with {} tokens (lowercase: {})",
            store.len(),
            store.lowercase
        );

        Ok(store)
    }

    /// Parse both documents from JSON text
    pub fn from_json(settings_json: &str, data_json: &str) -> Result<Self> {
        let settings: TokenizerSettings = serde_json::from_str(settings_json)?;
        let data: TokenizerData = serde_json::from_str(data_json)?;
        Self::load(settings, data)
    }

    /// Read and parse both documents from disk
    pub fn from_files(settings_path: impl AsRef<Path>, data_path: impl AsRef<Path>) -> Result<Self> {
        let settings_path = settings_path.as_ref();
        let data_path = data_path.as_ref();
        debug!("Loading tokenizer from {:?} and {:?}", settings_path, data_path);

        let settings_json = fs::read_to_string(settings_path).map_err(|e| {
            Error::FileSystem(format!("Failed to read {}: {}", settings_path.display(), e))
        })?;
        let data_json = fs::read_to_string(data_path).map_err(|e| {
            Error::FileSystem(format!("Failed to read {}: {}", data_path.display(), e))
        })?;

        Self::from_json(&settings_json, &data_json)
    }

    /// Look up a token id
    pub fn id(&self, token: &str) -> Option<u32> {
        self.token_to_id.get(token).copied()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.token_to_id.contains_key(token)
    }

    pub fn unk_token(&self) -> &str {
        &self.unk_token
    }

    pub fn pad_token(&self) -> &str {
        &self.pad_token
    }

    pub fn cls_token(&self) -> &str {
        &self.cls_token
    }

    pub fn sep_token(&self) -> &str {
        &self.sep_token
    }

    /// Whether input text is case-folded before tokenization
    pub fn lowercase(&self) -> bool {
        self.lowercase
    }

    /// Length in chars of the longest vocabulary entry
    pub fn longest_token_chars(&self) -> usize {
        self.longest_token_chars
    }

    pub fn len(&self) -> usize {
        self.token_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.token_to_id.is_empty()
    }
}
