//! Sentiment analysis on top of a binary classifier: single-flight model
//! loading, the analysis pipeline, and the ONNX Runtime engine adapter.

mod analyzer;
mod engine;
mod error;
mod loader;
mod progress;

#[cfg(feature = "onnx")]
mod onnx;

#[cfg(test)]
mod testing;

pub use analyzer::{Analysis, Analyzer};
pub use engine::{Classifier, Initializer};
pub use error::{AnalyzeError, InferenceError, InitError};
pub use loader::{Loader, LoaderState};
pub use progress::{LoadProgress, ProgressSink, ProgressStream};

#[cfg(feature = "onnx")]
pub use onnx::{ModelArtifacts, OnnxClassifier, OnnxInitializer};
