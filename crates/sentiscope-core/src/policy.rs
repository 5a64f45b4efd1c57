//! Three-way sentiment decision on top of a binary classifier.
//!
//! A positive/negative classifier always picks one of its two classes, even
//! for ambiguous or off-domain text. [`DecisionPolicy`] carves out a neutral
//! zone with two tests:
//!
//! - **margin**: the positive and negative scores are closer than
//!   `neutral_margin`
//! - **confidence floor**: the larger score is below `min_confidence`
//!
//! Either test alone sends the text to [`Sentiment::Neutral`]. Otherwise the
//! larger score wins, with ties going to [`Sentiment::Positive`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::score::RawScoreSet;

pub const DEFAULT_NEUTRAL_MARGIN: f64 = 0.1;
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.6;

/// Label token identifying the positive class.
const POSITIVE_TOKEN: &str = "POS";
/// Label token identifying the negative class.
const NEGATIVE_TOKEN: &str = "NEG";

/// The three possible outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }

    /// Capitalized name for display.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Positive => "Positive",
            Self::Negative => "Negative",
            Self::Neutral => "Neutral",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Positive => "😃",
            Self::Negative => "😡",
            Self::Neutral => "😐",
        }
    }

    /// Style tag for renderers (badge class, colour key).
    pub fn style_tag(&self) -> &'static str {
        self.as_str()
    }

    /// Map a dataset or engine label ("positive", "NEGATIVE", ...) onto a
    /// sentiment, using the same substring matching as score extraction.
    pub fn from_label(label: &str) -> Option<Self> {
        let upper = label.to_ascii_uppercase();
        if upper.contains(POSITIVE_TOKEN) {
            Some(Self::Positive)
        } else if upper.contains(NEGATIVE_TOKEN) {
            Some(Self::Negative)
        } else if upper.contains("NEU") {
            Some(Self::Neutral)
        } else {
            None
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Outcome of one analysis.
///
/// For [`Sentiment::Neutral`] the confidence is `1 - |pos - neg|`: a display
/// heuristic for how close the two classes were, not a calibrated
/// probability, and not comparable to a positive/negative confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub label: Sentiment,
    pub confidence: f64,
}

impl Decision {
    /// Confidence rounded to two decimals. Display only.
    pub fn rounded_confidence(&self) -> f64 {
        (self.confidence * 100.0).round() / 100.0
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (confidence: {:.2})",
            self.label.emoji(),
            self.label.display_name(),
            self.rounded_confidence()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum PolicyError {
    #[error("{name} must be within [0, 1], got {value}")]
    OutOfRange { name: &'static str, value: f64 },
}

/// Thresholds for the neutral zone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PolicyParams")]
pub struct DecisionPolicy {
    neutral_margin: f64,
    min_confidence: f64,
}

/// Unchecked form read from config; goes through [`DecisionPolicy::new`].
#[derive(Deserialize)]
struct PolicyParams {
    #[serde(default = "default_neutral_margin")]
    neutral_margin: f64,
    #[serde(default = "default_min_confidence")]
    min_confidence: f64,
}

fn default_neutral_margin() -> f64 {
    DEFAULT_NEUTRAL_MARGIN
}

fn default_min_confidence() -> f64 {
    DEFAULT_MIN_CONFIDENCE
}

impl TryFrom<PolicyParams> for DecisionPolicy {
    type Error = PolicyError;

    fn try_from(params: PolicyParams) -> Result<Self, Self::Error> {
        Self::new(params.neutral_margin, params.min_confidence)
    }
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            neutral_margin: DEFAULT_NEUTRAL_MARGIN,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

impl DecisionPolicy {
    pub fn new(neutral_margin: f64, min_confidence: f64) -> Result<Self, PolicyError> {
        check_unit("neutral_margin", neutral_margin)?;
        check_unit("min_confidence", min_confidence)?;
        Ok(Self {
            neutral_margin,
            min_confidence,
        })
    }

    pub fn neutral_margin(&self) -> f64 {
        self.neutral_margin
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    /// Decide the sentiment for one score set.
    ///
    /// Missing classes count as a score of 0. Scores are read through
    /// [`unit_score`] so a malformed engine value cannot push the confidence
    /// outside [0, 1]; the score set itself is left untouched.
    pub fn decide(&self, scores: &RawScoreSet) -> Decision {
        let pos = unit_score(scores.score_for(POSITIVE_TOKEN));
        let neg = unit_score(scores.score_for(NEGATIVE_TOKEN));
        let decision = self.decide_scores(pos, neg);
        debug!(
            pos,
            neg,
            label = decision.label.as_str(),
            confidence = decision.confidence,
            "sentiment decided"
        );
        decision
    }

    /// Decide from already-extracted positive and negative scores.
    pub fn decide_scores(&self, pos: f64, neg: f64) -> Decision {
        let pos = unit_score(Some(pos));
        let neg = unit_score(Some(neg));
        let diff = (pos - neg).abs();
        let max_prob = pos.max(neg);

        if diff < self.neutral_margin || max_prob < self.min_confidence {
            return Decision {
                label: Sentiment::Neutral,
                confidence: 1.0 - diff,
            };
        }

        // `>=`: an exact tie resolves to positive.
        if pos >= neg {
            Decision {
                label: Sentiment::Positive,
                confidence: pos,
            }
        } else {
            Decision {
                label: Sentiment::Negative,
                confidence: neg,
            }
        }
    }
}

/// Non-finite or absent scores read as 0; the rest are clamped to [0, 1].
fn unit_score(score: Option<f64>) -> f64 {
    match score {
        Some(s) if s.is_finite() => s.clamp(0.0, 1.0),
        _ => 0.0,
    }
}

fn check_unit(name: &'static str, value: f64) -> Result<(), PolicyError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PolicyError::OutOfRange { name, value })
    }
}
