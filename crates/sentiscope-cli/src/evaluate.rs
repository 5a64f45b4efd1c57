//! Spot-check a model against a labelled sample file.
//!
//! Two formats are read. CSV files carry a `review,sentiment` header, as in
//! the IMDB review dataset; JSON Lines files hold one
//! `{"text": ..., "label": ...}` object per line. Only samples labelled
//! `positive` or `negative` are kept; anything else, including malformed
//! records, is counted as skipped.

use std::fmt;
use std::path::Path;

use clap::ValueEnum;
use sentiscope_ai::{Analyzer, Initializer};
use sentiscope_core::Sentiment;
use serde::Deserialize;
use tracing::warn;

use crate::display::preview;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DatasetFormat {
    Csv,
    Jsonl,
}

impl DatasetFormat {
    /// `.csv` files are CSV; everything else is read as JSON Lines.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => Self::Csv,
            _ => Self::Jsonl,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CsvReview {
    review: String,
    sentiment: String,
}

#[derive(Debug, Deserialize)]
struct LabelledSample {
    text: String,
    label: String,
}

#[derive(Debug, Default)]
pub struct Dataset {
    pub samples: Vec<(String, Sentiment)>,
    pub skipped: usize,
}

impl Dataset {
    pub fn parse(format: DatasetFormat, contents: &str) -> Self {
        match format {
            DatasetFormat::Csv => Self::parse_csv(contents),
            DatasetFormat::Jsonl => Self::parse_jsonl(contents),
        }
    }

    pub fn parse_csv(contents: &str) -> Self {
        let mut dataset = Self::default();
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(contents.as_bytes());

        for (n, record) in reader.deserialize::<CsvReview>().enumerate() {
            match record {
                Ok(r) => dataset.push(r.review, &r.sentiment),
                Err(e) => {
                    warn!(record = n + 1, error = %e, "skipping malformed sample");
                    dataset.skipped += 1;
                }
            }
        }

        dataset
    }

    pub fn parse_jsonl(contents: &str) -> Self {
        let mut dataset = Self::default();

        for (n, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<LabelledSample>(line) {
                Ok(s) => dataset.push(s.text, &s.label),
                Err(e) => {
                    warn!(line = n + 1, error = %e, "skipping malformed sample");
                    dataset.skipped += 1;
                }
            }
        }

        dataset
    }

    fn push(&mut self, text: String, label: &str) {
        let label = match label.trim().to_ascii_lowercase().as_str() {
            "positive" => Sentiment::Positive,
            "negative" => Sentiment::Negative,
            _ => {
                self.skipped += 1;
                return;
            }
        };
        if text.trim().is_empty() {
            self.skipped += 1;
            return;
        }
        self.samples.push((text, label));
    }

    pub fn count(&self, label: Sentiment) -> usize {
        self.samples.iter().filter(|(_, l)| *l == label).count()
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Dataset statistics:")?;
        writeln!(f, "   Positive reviews: {}", self.count(Sentiment::Positive))?;
        writeln!(f, "   Negative reviews: {}", self.count(Sentiment::Negative))?;
        writeln!(f, "   Total: {}", self.samples.len())?;
        write!(f, "   Skipped: {}", self.skipped)
    }
}

/// Running tally of an evaluation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EvalSummary {
    pub evaluated: usize,
    pub correct: usize,
    pub neutral: usize,
    pub errors: usize,
}

impl EvalSummary {
    /// Record one sample. `predicted` is `None` when analysis failed.
    pub fn record(&mut self, expected: Sentiment, predicted: Option<Sentiment>) {
        self.evaluated += 1;
        match predicted {
            None => self.errors += 1,
            Some(Sentiment::Neutral) => self.neutral += 1,
            Some(label) if label == expected => self.correct += 1,
            Some(_) => {}
        }
    }

    /// Samples that got a positive or negative label.
    pub fn decided(&self) -> usize {
        self.evaluated - self.neutral - self.errors
    }

    /// Accuracy over decided samples; `None` if nothing was decided.
    pub fn accuracy(&self) -> Option<f64> {
        match self.decided() {
            0 => None,
            decided => Some(self.correct as f64 / decided as f64),
        }
    }
}

impl fmt::Display for EvalSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Evaluated {}: {} correct, {} neutral, {} errors",
            self.evaluated, self.correct, self.neutral, self.errors
        )?;
        if let Some(acc) = self.accuracy() {
            write!(f, " (accuracy on decided: {:.1}%)", acc * 100.0)?;
        }
        Ok(())
    }
}

/// Run up to `limit` samples through `analyzer`, printing each comparison.
pub async fn run<I: Initializer>(
    analyzer: &Analyzer<I>,
    dataset: &Dataset,
    limit: usize,
) -> EvalSummary {
    let mut summary = EvalSummary::default();

    for (i, (text, expected)) in dataset.samples.iter().take(limit).enumerate() {
        let predicted = match analyzer.analyze(text).await {
            Ok(decision) => {
                println!(
                    "   Sample {}: \"{}\"\n   Expected: {}, Predicted: {} ({:.2})",
                    i + 1,
                    preview(text),
                    expected.as_str(),
                    decision.label.as_str(),
                    decision.rounded_confidence()
                );
                Some(decision.label)
            }
            Err(e) => {
                println!("   Sample {}: prediction error: {}", i + 1, e.user_message());
                None
            }
        };
        summary.record(*expected, predicted);
    }

    summary
}
