use std::path::PathBuf;

use sentiscope_core::Backend;
use thiserror::Error;

/// The classifier could not be made ready.
///
/// `Clone` because one failed initialization is reported to every caller
/// that was waiting on it.
#[derive(Debug, Clone, Error)]
pub enum InitError {
    #[error("{artifact} not found in {}", dir.display())]
    MissingArtifact { artifact: String, dir: PathBuf },

    #[error("invalid model artifact: {0}")]
    Artifact(String),

    #[error("unsupported backend: {0}")]
    UnsupportedBackend(Backend),

    #[error("engine initialization failed: {0}")]
    Engine(String),
}

/// A single classification call failed. Does not affect the loader.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("inference failed: {0}")]
    Engine(String),

    #[error("malformed classifier output: {0}")]
    MalformedOutput(String),
}

/// Everything that can go wrong while analyzing one text.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("input text is empty")]
    EmptyInput,

    #[error(transparent)]
    Initialization(#[from] InitError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl AnalyzeError {
    /// Message suitable for showing to the person who submitted the text.
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyInput => "Please enter some text.".to_string(),
            Self::Initialization(e) => format!("Failed to load model: {e}"),
            Self::Inference(e) => format!("Failed to analyze sentiment: {e}"),
        }
    }
}
