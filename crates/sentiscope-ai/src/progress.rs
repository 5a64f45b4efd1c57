//! Load progress events and their fan-out to subscribers.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

/// One event in a model load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadProgress {
    /// Intermediate status from the initializer, e.g. `initiate` for
    /// `model.onnx`.
    Stage {
        status: String,
        name: Option<String>,
    },
    /// Terminal: the classifier is ready.
    Ready,
    /// Terminal: initialization failed with this message.
    Failed(String),
}

impl LoadProgress {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Stage { .. })
    }
}

impl fmt::Display for LoadProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stage { status, name: None } => f.write_str(status),
            Self::Stage {
                status,
                name: Some(name),
            } => write!(f, "{status} {name}"),
            Self::Ready => f.write_str("Model ready."),
            Self::Failed(msg) => write!(f, "Failed to load model: {msg}"),
        }
    }
}

/// Receiving end of a progress subscription. Ends after the terminal event.
pub type ProgressStream = UnboundedReceiver<LoadProgress>;

/// Handle through which an initializer reports progress.
///
/// Events go to every current subscriber in the order they are emitted.
/// Channels are unbounded, so nothing is dropped or coalesced.
#[derive(Clone, Default)]
pub struct ProgressSink {
    subscribers: Arc<Mutex<Vec<UnboundedSender<LoadProgress>>>>,
}

impl ProgressSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a stage, optionally naming the resource it concerns.
    pub fn stage(&self, status: impl Into<String>, name: Option<&str>) {
        let event = LoadProgress::Stage {
            status: status.into(),
            name: name.map(str::to_owned),
        };
        debug!(progress = %event, "load progress");
        self.broadcast(&event);
    }

    pub(crate) fn subscribe(&self) -> ProgressStream {
        let (tx, rx) = mpsc::unbounded();
        self.lock().push(tx);
        rx
    }

    /// Send a terminal event and close every open subscription.
    pub(crate) fn finish(&self, event: LoadProgress) {
        let subscribers = std::mem::take(&mut *self.lock());
        for tx in subscribers {
            let _ = tx.unbounded_send(event.clone());
        }
    }

    fn broadcast(&self, event: &LoadProgress) {
        // Drop subscribers whose receiver is gone.
        self.lock()
            .retain(|tx| tx.unbounded_send(event.clone()).is_ok());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<UnboundedSender<LoadProgress>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressSink")
            .field("subscribers", &self.lock().len())
            .finish()
    }
}
