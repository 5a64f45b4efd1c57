//! Text and JSON rendering of decisions.

use sentiscope_ai::Analysis;
use sentiscope_core::{Decision, RawScoreSet, Sentiment};
use serde::Serialize;

/// Characters of input shown before a result line.
const PREVIEW_CHARS: usize = 40;

/// One decision as emitted by `--json`.
#[derive(Debug, Serialize)]
pub struct DecisionRecord<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<&'a str>,
    pub label: Sentiment,
    pub confidence: f64,
    /// Two-decimal confidence as shown to users.
    pub display: String,
    pub style: &'static str,
    pub scores: &'a RawScoreSet,
    pub truncated: bool,
}

impl<'a> DecisionRecord<'a> {
    pub fn new(
        text: Option<&'a str>,
        decision: Decision,
        scores: &'a RawScoreSet,
        truncated: bool,
    ) -> Self {
        Self {
            text,
            label: decision.label,
            confidence: decision.confidence,
            display: decision.to_string(),
            style: decision.label.style_tag(),
            scores,
            truncated,
        }
    }

    pub fn from_analysis(text: &'a str, analysis: &'a Analysis) -> Self {
        Self::new(
            Some(text),
            analysis.decision,
            &analysis.scores,
            analysis.truncated,
        )
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Shorten `text` to [`PREVIEW_CHARS`] characters, marking the cut with `...`.
pub fn preview(text: &str) -> String {
    let text = text.trim();
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Human-readable result line, prefixed by a preview of the input when
/// several inputs are being reported together.
pub fn result_line(text: &str, decision: &Decision, with_input: bool) -> String {
    if with_input {
        format!("\"{}\"  {decision}", preview(text))
    } else {
        decision.to_string()
    }
}
