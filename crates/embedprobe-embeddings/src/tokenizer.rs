//! WordPiece-style tokenization into fixed-length model inputs
//!
//! Words are split on whitespace and broken into vocabulary pieces by greedy
//! longest-prefix matching. Pieces carry no continuation marker: a word that
//! is not itself in the vocabulary is covered left to right by the longest
//! known prefix of whatever remains. A character no prefix can start becomes
//! the unknown token, so every character of the input is accounted for.

use std::borrow::Cow;
use std::fmt;

use tracing::trace;

use crate::vocab::VocabularyStore;

/// Positions reserved for the class and separator tokens
const SPECIAL_TOKEN_COUNT: usize = 2;

/// Tokenizer over an immutable vocabulary
///
/// `tokenize` takes `&self` and touches no shared mutable state, so one
/// tokenizer can serve concurrent callers.
pub struct Tokenizer {
    vocab: VocabularyStore,
}

impl fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokenizer")
            .field("vocab_size", &self.vocab.len())
            .field("lowercase", &self.vocab.lowercase())
            .finish_non_exhaustive()
    }
}

impl Tokenizer {
    pub fn new(vocab: VocabularyStore) -> Self {
        Self { vocab }
    }

    pub fn vocab(&self) -> &VocabularyStore {
        &self.vocab
    }

    /// Tokenize text into exactly `max_length` ids with attention mask
    ///
    /// The sequence is `[CLS] pieces.. [SEP]` followed by padding. Pieces are
    /// truncated so both special tokens fit; when `max_length` is below 2 the
    /// special-token sequence itself is cut to length.
    pub fn tokenize(
        &self,
        text: &str,
        max_length: usize,
        include_token_type_ids: bool,
    ) -> TokenizedInput {
        let normalized = self.normalize(text);
        let sequence = self.build_sequence(&normalized, max_length);

        let input_ids: Vec<i64> = sequence.iter().map(|token| self.token_id(token)).collect();
        let pad = self.vocab.pad_token();
        let attention_mask: Vec<i64> = sequence
            .iter()
            .map(|token| i64::from(*token != pad))
            .collect();
        let token_type_ids = include_token_type_ids.then(|| vec![0i64; max_length]);

        trace!(
            "Tokenized {} chars into {} real tokens (max_length {})",
            text.len(),
            attention_mask.iter().filter(|&&m| m == 1).count(),
            max_length
        );

        TokenizedInput {
            input_ids,
            attention_mask,
            token_type_ids,
        }
    }

    /// Tokenize several texts with the same settings
    pub fn tokenize_batch(
        &self,
        texts: &[&str],
        max_length: usize,
        include_token_type_ids: bool,
    ) -> Vec<TokenizedInput> {
        texts
            .iter()
            .map(|text| self.tokenize(text, max_length, include_token_type_ids))
            .collect()
    }

    /// The final token strings `tokenize` would map to ids
    pub fn tokens(&self, text: &str, max_length: usize) -> Vec<String> {
        let normalized = self.normalize(text);
        self.build_sequence(&normalized, max_length)
            .into_iter()
            .map(str::to_owned)
            .collect()
    }

    /// Split already-normalized text into vocabulary pieces, no special tokens
    pub fn split_words<'a>(&'a self, text: &'a str) -> Vec<&'a str> {
        let mut pieces = Vec::new();
        for word in text.split_whitespace() {
            self.split_word(word, &mut pieces);
        }
        pieces
    }

    fn normalize<'t>(&self, text: &'t str) -> Cow<'t, str> {
        if self.vocab.lowercase() {
            Cow::Owned(text.to_lowercase())
        } else {
            Cow::Borrowed(text)
        }
    }

    fn build_sequence<'a>(&'a self, text: &'a str, max_length: usize) -> Vec<&'a str> {
        let mut pieces = self.split_words(text);
        pieces.truncate(max_length.saturating_sub(SPECIAL_TOKEN_COUNT));

        let mut sequence = Vec::with_capacity(max_length.max(SPECIAL_TOKEN_COUNT));
        sequence.push(self.vocab.cls_token());
        sequence.extend(pieces);
        sequence.push(self.vocab.sep_token());

        sequence.truncate(max_length);
        sequence.resize(max_length, self.vocab.pad_token());
        sequence
    }

    fn split_word<'a>(&'a self, word: &'a str, out: &mut Vec<&'a str>) {
        if self.vocab.contains(word) {
            out.push(word);
            return;
        }

        let mut rest = word;
        while !rest.is_empty() {
            match self.longest_prefix(rest) {
                Some(end) => {
                    out.push(&rest[..end]);
                    rest = &rest[end..];
                }
                None => {
                    out.push(self.vocab.unk_token());
                    let step = rest.chars().next().map_or(rest.len(), char::len_utf8);
                    rest = &rest[step..];
                }
            }
        }
    }

    /// Byte length of the longest vocabulary prefix of `rest`
    fn longest_prefix(&self, rest: &str) -> Option<usize> {
        let ends: Vec<usize> = rest
            .char_indices()
            .map(|(i, c)| i + c.len_utf8())
            .take(self.vocab.longest_token_chars())
            .collect();

        ends.into_iter()
            .rev()
            .find(|&end| self.vocab.contains(&rest[..end]))
    }

    fn token_id(&self, token: &str) -> i64 {
        self.vocab
            .id(token)
            .or_else(|| self.vocab.id(self.vocab.unk_token()))
            .map_or(0, i64::from)
    }
}

/// Fixed-length model input for a single text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizedInput {
    /// Token IDs
    pub input_ids: Vec<i64>,
    /// Attention mask (1 for real tokens, 0 for padding)
    pub attention_mask: Vec<i64>,
    /// All-zero segment ids, present only for models that take them
    pub token_type_ids: Option<Vec<i64>>,
}

impl TokenizedInput {
    /// Get the sequence length
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    /// Check if the input is empty
    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }

    /// Number of non-padding positions
    pub fn real_tokens(&self) -> usize {
        self.attention_mask.iter().filter(|&&m| m == 1).count()
    }
}
