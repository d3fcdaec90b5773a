//! Qualitative bands for similarity scores
//!
//! Two threshold tables exist and are kept apart: `BandingPolicy::Detailed`
//! (five bands) and `BandingPolicy::Coarse` (four bands, lower cut-offs).

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Five-band reading of a score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimilarityBand {
    VeryHigh,
    Strong,
    Moderate,
    Slight,
    Low,
}

impl SimilarityBand {
    pub fn classify(score: f32) -> Self {
        if score > 0.8 {
            SimilarityBand::VeryHigh
        } else if score > 0.6 {
            SimilarityBand::Strong
        } else if score > 0.4 {
            SimilarityBand::Moderate
        } else if score > 0.2 {
            SimilarityBand::Slight
        } else {
            SimilarityBand::Low
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SimilarityBand::VeryHigh => "very high",
            SimilarityBand::Strong => "strong",
            SimilarityBand::Moderate => "moderate",
            SimilarityBand::Slight => "slight",
            SimilarityBand::Low => "low",
        }
    }
}

/// Four-band reading of a score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchBand {
    VerySimilar,
    ModeratelySimilar,
    SlightlySimilar,
    NotSimilar,
}

impl MatchBand {
    pub fn classify(score: f32) -> Self {
        if score > 0.8 {
            MatchBand::VerySimilar
        } else if score > 0.5 {
            MatchBand::ModeratelySimilar
        } else if score > 0.3 {
            MatchBand::SlightlySimilar
        } else {
            MatchBand::NotSimilar
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MatchBand::VerySimilar => "very similar",
            MatchBand::ModeratelySimilar => "moderately similar",
            MatchBand::SlightlySimilar => "slightly similar",
            MatchBand::NotSimilar => "not similar",
        }
    }
}

/// Which threshold table a call site reads scores with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BandingPolicy {
    #[default]
    Detailed,
    Coarse,
}

impl BandingPolicy {
    pub fn label(&self, score: f32) -> &'static str {
        match self {
            BandingPolicy::Detailed => SimilarityBand::classify(score).label(),
            BandingPolicy::Coarse => MatchBand::classify(score).label(),
        }
    }
}

impl FromStr for BandingPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "detailed" => Ok(BandingPolicy::Detailed),
            "coarse" => Ok(BandingPolicy::Coarse),
            other => Err(Error::InvalidArgument(format!(
                "Unknown banding policy '{}': expected 'detailed' or 'coarse'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detailed_bands() {
        assert_eq!(BandingPolicy::Detailed.label(0.95), "very high");
        assert_eq!(BandingPolicy::Detailed.label(0.8), "strong");
        assert_eq!(BandingPolicy::Detailed.label(0.61), "strong");
        assert_eq!(BandingPolicy::Detailed.label(0.6), "moderate");
        assert_eq!(BandingPolicy::Detailed.label(0.41), "moderate");
        assert_eq!(BandingPolicy::Detailed.label(0.3), "slight");
        assert_eq!(BandingPolicy::Detailed.label(0.2), "low");
        assert_eq!(BandingPolicy::Detailed.label(-1.0), "low");
    }

    #[test]
    fn test_coarse_bands() {
        assert_eq!(BandingPolicy::Coarse.label(0.81), "very similar");
        assert_eq!(BandingPolicy::Coarse.label(0.8), "moderately similar");
        assert_eq!(BandingPolicy::Coarse.label(0.5), "slightly similar");
        assert_eq!(BandingPolicy::Coarse.label(0.31), "slightly similar");
        assert_eq!(BandingPolicy::Coarse.label(0.3), "not similar");
        assert_eq!(BandingPolicy::Coarse.label(-0.5), "not similar");
    }

    #[test]
    fn test_policies_disagree_between_thresholds() {
        // 0.55 sits above the coarse 0.5 cut but below the detailed 0.6 cut
        assert_eq!(SimilarityBand::classify(0.55), SimilarityBand::Moderate);
        assert_eq!(MatchBand::classify(0.55), MatchBand::ModeratelySimilar);
        assert_eq!(SimilarityBand::classify(0.25), SimilarityBand::Slight);
        assert_eq!(MatchBand::classify(0.25), MatchBand::NotSimilar);
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("detailed".parse::<BandingPolicy>().unwrap(), BandingPolicy::Detailed);
        assert_eq!("Coarse".parse::<BandingPolicy>().unwrap(), BandingPolicy::Coarse);
        assert!(matches!(
            "fuzzy".parse::<BandingPolicy>(),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_policy_serde_lowercase() {
        let json = serde_json::to_string(&BandingPolicy::Coarse).unwrap();
        assert_eq!(json, "\"coarse\"");
        let parsed: BandingPolicy = serde_json::from_str("\"detailed\"").unwrap();
        assert_eq!(parsed, BandingPolicy::Detailed);
        assert!(serde_json::from_str::<BandingPolicy>("\"fuzzy\"").is_err());
    }
}
