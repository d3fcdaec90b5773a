//! Cosine similarity, labelled comparison, and reference ranking

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use embedprobe_core::{Error, Result};

pub use embedprobe_core::banding::{BandingPolicy, MatchBand, SimilarityBand};

/// Cosine similarity clamped to `[-1.0, 1.0]`
///
/// Returns `0.0` when either vector is empty or the lengths differ, and
/// when either norm is zero or the score is not finite. Bit-identical
/// vectors score exactly `1.0` without going through the dot product.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    if a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits()) {
        return 1.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let score = dot / (norm_a.sqrt() * norm_b.sqrt());
    if !score.is_finite() {
        return 0.0;
    }
    (score as f32).clamp(-1.0, 1.0)
}

/// A score together with its label under some policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityResult {
    pub score: f32,
    pub label: &'static str,
}

impl fmt::Display for SimilarityResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4} ({})", self.score, self.label)
    }
}

/// Score two vectors and label the result
pub fn compare(a: &[f32], b: &[f32], policy: BandingPolicy) -> SimilarityResult {
    let score = cosine_similarity(a, b);
    SimilarityResult {
        score,
        label: policy.label(score),
    }
}

/// A named reference embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEmbedding {
    pub name: String,
    pub vector: Vec<f32>,
}

/// One scored reference
#[derive(Debug, Clone, PartialEq)]
pub struct RankedMatch<'a> {
    pub name: &'a str,
    pub result: SimilarityResult,
}

/// Reference embeddings a query is compared against
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceSet {
    entries: Vec<ReferenceEmbedding>,
}

impl ReferenceSet {
    pub fn new(entries: Vec<ReferenceEmbedding>) -> Self {
        Self { entries }
    }

    /// Parse a JSON array of `{"name": .., "vector": [..]}`
    pub fn from_json(json: &str) -> Result<Self> {
        let entries: Vec<ReferenceEmbedding> = serde_json::from_str(json)?;
        Ok(Self::new(entries))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            Error::FileSystem(format!("Failed to read references {}: {}", path.display(), e))
        })?;
        let set = Self::from_json(&json)?;
        debug!("Loaded {} reference embeddings from {:?}", set.len(), path);
        Ok(set)
    }

    /// Score every reference, best first; ties keep file order
    pub fn rank(&self, query: &[f32], policy: BandingPolicy) -> Vec<RankedMatch<'_>> {
        let mut ranked: Vec<RankedMatch<'_>> = self
            .entries
            .iter()
            .map(|entry| RankedMatch {
                name: &entry.name,
                result: compare(query, &entry.vector, policy),
            })
            .collect();
        ranked.sort_by(|a, b| b.result.score.total_cmp(&a.result.score));
        ranked
    }

    pub fn entries(&self) -> &[ReferenceEmbedding] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Short display form: the first `n` values to four decimals, then `...`
pub fn preview(vector: &[f32], n: usize) -> String {
    let head: Vec<String> = vector.iter().take(n).map(|v| format!("{:.4}", v)).collect();
    if vector.len() > n {
        format!("[{}, ...]", head.join(", "))
    } else {
        format!("[{}]", head.join(", "))
    }
}
