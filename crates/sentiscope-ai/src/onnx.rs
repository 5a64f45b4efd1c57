//! ONNX Runtime engine for sequence-classification sentiment models.
//!
//! Targets DistilBERT fine-tuned on SST-2 as exported for HuggingFace
//! (`distilbert-base-uncased-finetuned-sst-2-english`). The model directory
//! must contain `tokenizer.json` and `model.onnx` (or `model_quantized.onnx`),
//! either at the top level or under `onnx/`. An optional `config.json`
//! supplies the `id2label` mapping.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use sentiscope_core::{Backend, EngineConfig, RawOutput, ScoreEntry};
use serde::Deserialize;
use tokenizers::Tokenizer;
use tracing::{info, warn};

use crate::engine::{Classifier, Initializer};
use crate::error::{InferenceError, InitError};
use crate::progress::ProgressSink;

/// DistilBERT position limit.
const MAX_TOKENS: usize = 512;
const DEFAULT_LABELS: [&str; 2] = ["NEGATIVE", "POSITIVE"];

/// Builds an [`OnnxClassifier`] from the directory in [`EngineConfig`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OnnxInitializer;

#[async_trait]
impl Initializer for OnnxInitializer {
    type Classifier = OnnxClassifier;

    async fn initialize(
        &self,
        config: &EngineConfig,
        progress: ProgressSink,
    ) -> Result<OnnxClassifier, InitError> {
        if config.backend != Backend::Cpu {
            return Err(InitError::UnsupportedBackend(config.backend));
        }
        let artifacts = ModelArtifacts::locate(&config.model_dir, config.quantized)?;

        tokio::task::spawn_blocking(move || OnnxClassifier::load(&artifacts, &progress))
            .await
            .map_err(|e| InitError::Engine(format!("model loading task failed: {e}")))?
    }
}

/// Resolved paths of the files that make up a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelArtifacts {
    pub model: PathBuf,
    pub tokenizer: PathBuf,
    pub config: Option<PathBuf>,
}

impl ModelArtifacts {
    /// Find the model files under `dir`.
    ///
    /// With `quantized` set, `model_quantized.onnx` is preferred and
    /// `model.onnx` used as a fallback; otherwise only `model.onnx` is used.
    pub fn locate(dir: &Path, quantized: bool) -> Result<Self, InitError> {
        let tokenizer = dir.join("tokenizer.json");
        if !tokenizer.exists() {
            return Err(InitError::MissingArtifact {
                artifact: "tokenizer.json".into(),
                dir: dir.to_path_buf(),
            });
        }

        let config = Some(dir.join("config.json")).filter(|p| p.exists());

        let mut names = Vec::with_capacity(2);
        if quantized {
            names.push("model_quantized.onnx");
        }
        names.push("model.onnx");

        for (i, name) in names.iter().enumerate() {
            if let Some(model) = find_in(dir, name) {
                if i > 0 {
                    warn!(
                        dir = %dir.display(),
                        "quantized model not found, using full-precision model.onnx"
                    );
                }
                return Ok(Self {
                    model,
                    tokenizer,
                    config,
                });
            }
        }

        Err(InitError::MissingArtifact {
            artifact: names[0].to_string(),
            dir: dir.to_path_buf(),
        })
    }
}

fn find_in(dir: &Path, name: &str) -> Option<PathBuf> {
    [dir.join(name), dir.join("onnx").join(name)]
        .into_iter()
        .find(|p| p.exists())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[derive(Deserialize)]
struct ModelConfig {
    #[serde(default)]
    id2label: HashMap<String, String>,
}

/// Binary sentiment classifier backed by an ONNX Runtime session.
pub struct OnnxClassifier {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    labels: Arc<[String]>,
}

impl OnnxClassifier {
    /// Load tokenizer, label map, and session, reporting each file.
    pub fn load(artifacts: &ModelArtifacts, progress: &ProgressSink) -> Result<Self, InitError> {
        let tokenizer_name = file_name(&artifacts.tokenizer);
        progress.stage("initiate", Some(&tokenizer_name));
        let tokenizer = load_tokenizer(&artifacts.tokenizer)
            .map_err(|e| InitError::Artifact(format!("{e:#}")))?;
        progress.stage("done", Some(&tokenizer_name));

        let labels = match &artifacts.config {
            Some(path) => {
                let config_name = file_name(path);
                progress.stage("initiate", Some(&config_name));
                let labels =
                    read_labels(path).map_err(|e| InitError::Artifact(format!("{e:#}")))?;
                progress.stage("done", Some(&config_name));
                labels
            }
            None => DEFAULT_LABELS.iter().map(|s| s.to_string()).collect(),
        };

        let model_name = file_name(&artifacts.model);
        progress.stage("initiate", Some(&model_name));
        let session = load_session(&artifacts.model)
            .map_err(|e| InitError::Artifact(format!("load {model_name}: {e:#}")))?;
        progress.stage("done", Some(&model_name));

        info!(model = %artifacts.model.display(), ?labels, "loaded sentiment model");
        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            labels: labels.into(),
        })
    }

    /// Class labels in logit order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

#[async_trait]
impl Classifier for OnnxClassifier {
    async fn classify(&self, text: &str) -> Result<RawOutput, InferenceError> {
        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let text = text.to_owned();

        let logits = tokio::task::spawn_blocking(move || run_logits(&session, &tokenizer, &text))
            .await
            .map_err(|e| InferenceError::Engine(format!("inference task failed: {e}")))?
            .map_err(|e| InferenceError::Engine(format!("{e:#}")))?;

        if logits.len() != self.labels.len() {
            return Err(InferenceError::MalformedOutput(format!(
                "{} logits for {} labels",
                logits.len(),
                self.labels.len()
            )));
        }

        let entries = self
            .labels
            .iter()
            .zip(softmax(&logits))
            .map(|(label, score)| ScoreEntry::new(label.clone(), f64::from(score)))
            .collect();
        Ok(RawOutput::List(entries))
    }
}

fn load_session(path: &Path) -> anyhow::Result<Session> {
    Ok(Session::builder()?.commit_from_file(path)?)
}

fn load_tokenizer(path: &Path) -> anyhow::Result<Tokenizer> {
    let mut tokenizer =
        Tokenizer::from_file(path).map_err(|e| anyhow::anyhow!("load tokenizer: {e}"))?;

    tokenizer
        .with_truncation(Some(tokenizers::TruncationParams {
            max_length: MAX_TOKENS,
            ..Default::default()
        }))
        .map_err(|e| anyhow::anyhow!("set truncation: {e}"))?;

    // One text per call, so no padding.
    tokenizer.with_padding(None);
    Ok(tokenizer)
}

/// Read `id2label` from `config.json`, ordered by class index.
fn read_labels(path: &Path) -> anyhow::Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)?;
    let config: ModelConfig = serde_json::from_str(&raw)?;
    if config.id2label.is_empty() {
        return Ok(DEFAULT_LABELS.iter().map(|s| s.to_string()).collect());
    }

    let mut indexed = config
        .id2label
        .into_iter()
        .map(|(id, label)| {
            id.parse::<usize>()
                .map(|i| (i, label))
                .map_err(|_| anyhow::anyhow!("non-numeric id2label key {id:?}"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    indexed.sort_by_key(|(i, _)| *i);

    for (expected, (i, _)) in indexed.iter().enumerate() {
        anyhow::ensure!(*i == expected, "id2label is missing index {expected}");
    }
    Ok(indexed.into_iter().map(|(_, label)| label).collect())
}

/// Run the session on one text and return the logits of the single row.
fn run_logits(
    session: &Mutex<Session>,
    tokenizer: &Tokenizer,
    text: &str,
) -> anyhow::Result<Vec<f32>> {
    let encoding = tokenizer
        .encode(text, true)
        .map_err(|e| anyhow::anyhow!("tokenize: {e}"))?;

    let seq_len = encoding.get_ids().len();
    let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
    let attention_mask: Vec<i64> = encoding
        .get_attention_mask()
        .iter()
        .map(|&m| m as i64)
        .collect();

    let shape = [1i64, seq_len as i64];
    let ids_tensor = Tensor::from_array((shape, input_ids.into_boxed_slice()))?;
    let mask_tensor = Tensor::from_array((shape, attention_mask.into_boxed_slice()))?;

    let mut session = session
        .lock()
        .map_err(|_| anyhow::anyhow!("session lock poisoned"))?;
    let outputs = session.run(ort::inputs![
        "input_ids" => ids_tensor,
        "attention_mask" => mask_tensor,
    ])?;

    // Logits: [1, num_labels].
    let (output_shape, output_data) = outputs[0].try_extract_tensor::<f32>()?;
    let dims: &[i64] = output_shape;
    anyhow::ensure!(
        dims.len() == 2 && dims[0] == 1,
        "unexpected output shape: {dims:?}, expected [1, num_labels]"
    );
    Ok(output_data.to_vec())
}

/// Numerically stable softmax.
fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
