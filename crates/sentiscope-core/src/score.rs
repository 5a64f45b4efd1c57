//! Raw classifier scores and the normalization of engine output shapes.
//!
//! Text-classification engines return their scores in one of three shapes
//! depending on the version and on whether all classes were requested:
//!
//! - a single `{label, score}` object (top-1, some versions)
//! - a flat list `[{label, score}, ...]` (top-1 or all classes)
//! - a nested list `[[{label, score}, ...]]` (all classes, batched)
//!
//! [`RawOutput`] captures all three; [`RawOutput::into_score_set`] collapses
//! them into one canonical [`RawScoreSet`] right at the engine boundary.

use serde::{Deserialize, Serialize};

/// One label/score pair as reported by the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub label: String,
    pub score: f64,
}

impl ScoreEntry {
    pub fn new(label: impl Into<String>, score: f64) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }

    /// Case-insensitive substring match on the label.
    pub fn label_contains(&self, token: &str) -> bool {
        self.label
            .to_ascii_uppercase()
            .contains(&token.to_ascii_uppercase())
    }
}

/// Ordered, read-only set of scores for one input text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawScoreSet {
    entries: Vec<ScoreEntry>,
}

impl RawScoreSet {
    pub fn new(entries: Vec<ScoreEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ScoreEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Score of the first entry whose label contains `token`, ignoring case.
    pub fn score_for(&self, token: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.label_contains(token))
            .map(|e| e.score)
    }
}

impl From<Vec<ScoreEntry>> for RawScoreSet {
    fn from(entries: Vec<ScoreEntry>) -> Self {
        Self::new(entries)
    }
}

impl FromIterator<ScoreEntry> for RawScoreSet {
    fn from_iter<T: IntoIterator<Item = ScoreEntry>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Scores exactly as an engine hands them back, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawOutput {
    Single(ScoreEntry),
    List(Vec<ScoreEntry>),
    Nested(Vec<Vec<ScoreEntry>>),
}

impl RawOutput {
    /// Collapse to the canonical shape.
    ///
    /// A nested output contributes only its first inner list (the scores for
    /// the single submitted text); an empty nested output yields an empty set.
    pub fn into_score_set(self) -> RawScoreSet {
        match self {
            Self::Single(entry) => RawScoreSet::new(vec![entry]),
            Self::List(entries) => RawScoreSet::new(entries),
            Self::Nested(batches) => batches
                .into_iter()
                .next()
                .map(RawScoreSet::new)
                .unwrap_or_default(),
        }
    }

    /// Parse engine output from JSON in any of the three shapes.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl From<RawOutput> for RawScoreSet {
    fn from(value: RawOutput) -> Self {
        value.into_score_set()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_match_ignores_case() {
        let e = ScoreEntry::new("positive", 0.9);
        assert!(e.label_contains("POS"));
        assert!(!e.label_contains("NEG"));

        let e = ScoreEntry::new("LABEL_NEGative", 0.1);
        assert!(e.label_contains("neg"));
    }

    #[test]
    fn score_for_takes_first_match() {
        let set: RawScoreSet = vec![
            ScoreEntry::new("POSITIVE", 0.7),
            ScoreEntry::new("NEGATIVE", 0.3),
            ScoreEntry::new("POSITIVE", 0.1),
        ]
        .into();
        assert_eq!(set.score_for("POS"), Some(0.7));
        assert_eq!(set.score_for("NEG"), Some(0.3));
        assert_eq!(set.score_for("NEU"), None);
    }

    #[test]
    fn single_object_normalizes_to_one_entry() {
        let raw = RawOutput::from_json(r#"{"label": "POSITIVE", "score": 0.97}"#).unwrap();
        assert!(matches!(raw, RawOutput::Single(_)));

        let set = raw.into_score_set();
        assert_eq!(set.len(), 1);
        assert_eq!(set.entries()[0].label, "POSITIVE");
    }

    #[test]
    fn flat_list_is_kept_in_order() {
        let raw = RawOutput::from_json(
            r#"[{"label": "NEGATIVE", "score": 0.2}, {"label": "POSITIVE", "score": 0.8}]"#,
        )
        .unwrap();
        assert!(matches!(raw, RawOutput::List(_)));

        let set = raw.into_score_set();
        let labels: Vec<&str> = set.entries().iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, ["NEGATIVE", "POSITIVE"]);
    }

    #[test]
    fn nested_list_uses_first_inner_list() {
        let raw = RawOutput::from_json(
            r#"[[{"label": "POSITIVE", "score": 0.6}, {"label": "NEGATIVE", "score": 0.4}]]"#,
        )
        .unwrap();
        assert!(matches!(raw, RawOutput::Nested(_)));

        let set = raw.into_score_set();
        assert_eq!(set.len(), 2);
        assert_eq!(set.score_for("pos"), Some(0.6));
    }

    #[test]
    fn empty_shapes_normalize_to_empty_set() {
        assert!(RawOutput::Nested(vec![]).into_score_set().is_empty());
        assert!(RawOutput::List(vec![]).into_score_set().is_empty());
    }

    #[test]
    fn score_set_serializes_as_plain_list() {
        let set: RawScoreSet = vec![ScoreEntry::new("POSITIVE", 0.5)].into();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"[{"label":"POSITIVE","score":0.5}]"#);
    }
}
