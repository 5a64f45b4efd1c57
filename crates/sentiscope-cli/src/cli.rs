use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use sentiscope_core::{
    Backend, DEFAULT_MIN_CONFIDENCE, DEFAULT_NEUTRAL_MARGIN, DecisionPolicy, EngineConfig,
    InputPolicy,
};

use crate::evaluate::DatasetFormat;

#[derive(Debug, Parser)]
#[command(
    name = "sentiscope",
    version,
    about = "Positive, negative, or neutral: sentiment from a local classifier"
)]
pub struct Args {
    /// Log verbosity: -v for info, -vv for debug.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Analyze each argument, or each stdin line when none are given.
    Analyze {
        texts: Vec<String>,
        /// Print one JSON object per input.
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        engine: EngineArgs,
        #[command(flatten)]
        policy: PolicyArgs,
    },
    /// Start loading the model right away, then analyze lines typed on stdin.
    Interactive {
        #[command(flatten)]
        engine: EngineArgs,
        #[command(flatten)]
        policy: PolicyArgs,
    },
    /// Apply the decision policy to given scores, without a model.
    Decide {
        /// Positive-class score.
        #[arg(long, required_unless_present = "raw", requires = "neg", conflicts_with = "raw")]
        pos: Option<f64>,
        /// Negative-class score.
        #[arg(long, requires = "pos")]
        neg: Option<f64>,
        /// Engine output as JSON: an object, a list, or a nested list of
        /// `{"label", "score"}` entries.
        #[arg(long)]
        raw: Option<String>,
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        policy: PolicyArgs,
    },
    /// Compare predictions with a labelled sample file.
    Evaluate {
        /// CSV with `review,sentiment` columns, or JSON Lines with one
        /// `{"text": ..., "label": ...}` object per line.
        file: PathBuf,
        /// File format; defaults to CSV for `.csv` files, JSON Lines otherwise.
        #[arg(long, value_enum)]
        format: Option<DatasetFormat>,
        /// Maximum number of samples to run through the model.
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[command(flatten)]
        engine: EngineArgs,
        #[command(flatten)]
        policy: PolicyArgs,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendChoice {
    Cpu,
    Cuda,
    Wasm,
}

impl From<BackendChoice> for Backend {
    fn from(value: BackendChoice) -> Self {
        match value {
            BackendChoice::Cpu => Backend::Cpu,
            BackendChoice::Cuda => Backend::Cuda,
            BackendChoice::Wasm => Backend::Wasm,
        }
    }
}

#[derive(Debug, Clone, clap::Args)]
pub struct EngineArgs {
    /// Directory with tokenizer.json and the ONNX model.
    #[arg(long, env = "SENTISCOPE_MODEL_DIR", default_value = "models/distilbert-sst2")]
    pub model_dir: PathBuf,

    #[arg(long, value_enum, env = "SENTISCOPE_BACKEND", default_value_t = BackendChoice::Cpu)]
    pub backend: BackendChoice,

    /// Use model.onnx instead of the quantized variant.
    #[arg(long)]
    pub full_precision: bool,

    /// Truncate input to this many characters before classification.
    #[arg(long, env = "SENTISCOPE_MAX_CHARS")]
    pub max_chars: Option<usize>,
}

impl EngineArgs {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::new(&self.model_dir)
            .with_backend(self.backend.into())
            .with_quantized(!self.full_precision)
    }

    pub fn input_policy(&self) -> InputPolicy {
        InputPolicy::with_max_chars(self.max_chars)
    }
}

#[derive(Debug, Clone, clap::Args)]
pub struct PolicyArgs {
    /// Scores closer than this are neutral.
    #[arg(long, env = "SENTISCOPE_NEUTRAL_MARGIN", default_value_t = DEFAULT_NEUTRAL_MARGIN)]
    pub neutral_margin: f64,

    /// A top score below this is neutral.
    #[arg(long, env = "SENTISCOPE_MIN_CONFIDENCE", default_value_t = DEFAULT_MIN_CONFIDENCE)]
    pub min_confidence: f64,
}

impl PolicyArgs {
    pub fn policy(&self) -> anyhow::Result<DecisionPolicy> {
        DecisionPolicy::new(self.neutral_margin, self.min_confidence)
            .context("invalid decision thresholds")
    }
}
