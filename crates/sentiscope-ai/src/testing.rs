//! In-memory engine used by the loader and analyzer tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sentiscope_core::{EngineConfig, RawOutput, ScoreEntry};

use crate::engine::{Classifier, Initializer};
use crate::error::{InferenceError, InitError};
use crate::progress::ProgressSink;

#[derive(Default)]
pub struct FakeInitializer {
    calls: Arc<AtomicUsize>,
    fail_first: usize,
    panic_first: usize,
    delay: Duration,
    stages: Vec<(&'static str, Option<&'static str>)>,
}

impl FakeInitializer {
    /// Counter of `initialize` invocations, shared with the test.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    /// Fail the first `n` initializations.
    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    /// Panic in the first `n` initializations.
    pub fn panicking_first(mut self, n: usize) -> Self {
        self.panic_first = n;
        self
    }

    pub fn with_stages(mut self, stages: &[(&'static str, Option<&'static str>)]) -> Self {
        self.stages = stages.to_vec();
        self
    }
}

#[async_trait]
impl Initializer for FakeInitializer {
    type Classifier = FakeClassifier;

    async fn initialize(
        &self,
        _config: &EngineConfig,
        progress: ProgressSink,
    ) -> Result<FakeClassifier, InitError> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        for &(status, name) in &self.stages {
            progress.stage(status, name);
            tokio::task::yield_now().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if attempt <= self.panic_first {
            panic!("attempt {attempt} blew up");
        }
        if attempt <= self.fail_first {
            return Err(InitError::Engine(format!("attempt {attempt} failed")));
        }
        Ok(FakeClassifier::default())
    }
}

/// Scores text by keyword and records every text it was given.
///
/// - "great" → positive 0.97 / negative 0.03 (nested shape)
/// - "awful" → positive 0.04 / negative 0.96 (flat list)
/// - "meh"   → positive 0.55 / negative 0.50
/// - "top1"  → single `POSITIVE` 0.65 entry
/// - "crash" → inference error
/// - anything else → 0.5 / 0.5
#[derive(Default)]
pub struct FakeClassifier {
    seen: Mutex<Vec<String>>,
}

impl FakeClassifier {
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

fn pair(pos: f64, neg: f64) -> Vec<ScoreEntry> {
    vec![
        ScoreEntry::new("POSITIVE", pos),
        ScoreEntry::new("NEGATIVE", neg),
    ]
}

#[async_trait]
impl Classifier for FakeClassifier {
    async fn classify(&self, text: &str) -> Result<RawOutput, InferenceError> {
        self.seen.lock().unwrap().push(text.to_string());
        let output = if text.contains("crash") {
            return Err(InferenceError::Engine("backend crashed".into()));
        } else if text.contains("great") {
            RawOutput::Nested(vec![pair(0.97, 0.03)])
        } else if text.contains("awful") {
            RawOutput::List(pair(0.04, 0.96))
        } else if text.contains("meh") {
            RawOutput::List(pair(0.55, 0.50))
        } else if text.contains("top1") {
            RawOutput::Single(ScoreEntry::new("POSITIVE", 0.65))
        } else {
            RawOutput::List(pair(0.5, 0.5))
        };
        Ok(output)
    }
}
