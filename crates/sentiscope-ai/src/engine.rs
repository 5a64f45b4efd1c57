//! The external classification capability, as seen by the loader.

use async_trait::async_trait;
use sentiscope_core::{EngineConfig, RawOutput};

use crate::error::{InferenceError, InitError};
use crate::progress::ProgressSink;

/// A ready-to-use binary sentiment classifier.
#[async_trait]
pub trait Classifier: Send + Sync + 'static {
    /// Score one text. Any length limit is the engine's own; callers that
    /// want a cap apply it before calling.
    async fn classify(&self, text: &str) -> Result<RawOutput, InferenceError>;
}

/// Builds a [`Classifier`]. Called at most once per successful load.
#[async_trait]
pub trait Initializer: Send + Sync + 'static {
    type Classifier: Classifier;

    async fn initialize(
        &self,
        config: &EngineConfig,
        progress: ProgressSink,
    ) -> Result<Self::Classifier, InitError>;
}
