//! End-to-end analysis of one text: input checks, loading, inference, decision.

use sentiscope_core::{Decision, DecisionPolicy, InputPolicy, RawScoreSet};
use tracing::{debug, warn};

use crate::engine::{Classifier, Initializer};
use crate::error::AnalyzeError;
use crate::loader::Loader;

/// Full result of analyzing one text.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub decision: Decision,
    /// Normalized scores the decision was made from.
    pub scores: RawScoreSet,
    /// Whether the input policy shortened the text before submission.
    pub truncated: bool,
}

/// Ties a [`Loader`] to a [`DecisionPolicy`] and an [`InputPolicy`].
pub struct Analyzer<I: Initializer> {
    loader: Loader<I>,
    policy: DecisionPolicy,
    input: InputPolicy,
}

impl<I: Initializer> Analyzer<I> {
    pub fn new(loader: Loader<I>, policy: DecisionPolicy, input: InputPolicy) -> Self {
        Self {
            loader,
            policy,
            input,
        }
    }

    pub fn loader(&self) -> &Loader<I> {
        &self.loader
    }

    pub fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    pub fn input_policy(&self) -> &InputPolicy {
        &self.input
    }

    /// Analyze `text` and return the decision.
    pub async fn analyze(&self, text: &str) -> Result<Decision, AnalyzeError> {
        self.analyze_detailed(text).await.map(|a| a.decision)
    }

    /// Analyze `text`, keeping the scores behind the decision.
    ///
    /// Blank input fails with [`AnalyzeError::EmptyInput`] before the loader
    /// is touched. A failed inference leaves the loader ready.
    pub async fn analyze_detailed(&self, text: &str) -> Result<Analysis, AnalyzeError> {
        let prepared = self.input.prepare(text).ok_or(AnalyzeError::EmptyInput)?;
        let truncated = prepared.len() < text.trim().len();
        if truncated {
            debug!(
                chars = prepared.chars().count(),
                "input truncated before classification"
            );
        }

        let classifier = self.loader.ensure_ready().await?;
        let scores = classifier.classify(prepared).await?.into_score_set();
        if scores.is_empty() {
            warn!("classifier returned no scores");
        }

        let decision = self.policy.decide(&scores);
        Ok(Analysis {
            decision,
            scores,
            truncated,
        })
    }
}
