//! Single-flight classifier loading.
//!
//! [`Loader`] owns the classifier handle. The first caller of
//! [`Loader::ensure_ready`] starts initialization; callers arriving while it
//! runs await the same in-flight future and see the same outcome. A failed
//! load leaves the loader in [`LoaderState::Failed`] and the next call
//! starts a fresh attempt.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::channel::mpsc;
use futures::future::{BoxFuture, Shared};
use sentiscope_core::EngineConfig;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::engine::Initializer;
use crate::error::InitError;
use crate::progress::{LoadProgress, ProgressSink, ProgressStream};

/// Observable lifecycle of the classifier handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    Uninitialized,
    Loading,
    Ready,
    Failed,
}

impl LoaderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for LoaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type LoadResult<C> = Result<Arc<C>, InitError>;
type LoadFuture<C> = Shared<BoxFuture<'static, LoadResult<C>>>;

enum Slot<C> {
    Uninitialized,
    Loading(LoadFuture<C>),
    Ready(Arc<C>),
    Failed(InitError),
}

enum Pending<C> {
    Ready(Arc<C>),
    Loading(LoadFuture<C>),
}

/// Owns a classifier and guarantees it is initialized at most once at a time.
pub struct Loader<I: Initializer> {
    initializer: Arc<I>,
    config: EngineConfig,
    slot: Arc<Mutex<Slot<I::Classifier>>>,
    progress: ProgressSink,
    attempts: AtomicUsize,
}

impl<I: Initializer> Loader<I> {
    pub fn new(initializer: I, config: EngineConfig) -> Self {
        Self {
            initializer: Arc::new(initializer),
            config,
            slot: Arc::new(Mutex::new(Slot::Uninitialized)),
            progress: ProgressSink::new(),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> LoaderState {
        match &*lock(&self.slot) {
            Slot::Uninitialized => LoaderState::Uninitialized,
            Slot::Loading(_) => LoaderState::Loading,
            Slot::Ready(_) => LoaderState::Ready,
            Slot::Failed(_) => LoaderState::Failed,
        }
    }

    /// Error from the most recent attempt, if it failed.
    pub fn last_error(&self) -> Option<InitError> {
        match &*lock(&self.slot) {
            Slot::Failed(e) => Some(e.clone()),
            _ => None,
        }
    }

    /// Number of initializations started so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Return the classifier, initializing it first if needed.
    pub async fn ensure_ready(&self) -> LoadResult<I::Classifier> {
        match self.pending() {
            Pending::Ready(classifier) => Ok(classifier),
            Pending::Loading(load) => load.await,
        }
    }

    /// Start initialization in the background without waiting for it.
    ///
    /// Must be called within a Tokio runtime. The handle resolves to the same
    /// outcome [`ensure_ready`](Self::ensure_ready) would return.
    pub fn preload(&self) -> JoinHandle<LoadResult<I::Classifier>> {
        match self.pending() {
            Pending::Ready(classifier) => tokio::spawn(async move { Ok(classifier) }),
            Pending::Loading(load) => tokio::spawn(load),
        }
    }

    /// Subscribe to progress of the current or next load.
    ///
    /// The stream yields stage events in emission order and ends after the
    /// terminal [`LoadProgress::Ready`] or [`LoadProgress::Failed`]. If the
    /// classifier is already ready it yields `Ready` alone.
    pub fn subscribe(&self) -> ProgressStream {
        let slot = lock(&self.slot);
        if let Slot::Ready(_) = &*slot {
            let (tx, rx) = mpsc::unbounded();
            let _ = tx.unbounded_send(LoadProgress::Ready);
            return rx;
        }
        self.progress.subscribe()
    }

    fn pending(&self) -> Pending<I::Classifier> {
        let mut slot = lock(&self.slot);
        match &*slot {
            Slot::Ready(classifier) => return Pending::Ready(Arc::clone(classifier)),
            Slot::Loading(load) => return Pending::Loading(load.clone()),
            Slot::Uninitialized | Slot::Failed(_) => {}
        }
        let load = self.start_load();
        *slot = Slot::Loading(load.clone());
        Pending::Loading(load)
    }

    /// Build the shared load future. The future itself records the outcome
    /// in the slot, so the transition happens once no matter how many
    /// callers await it.
    fn start_load(&self) -> LoadFuture<I::Classifier> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let initializer = Arc::clone(&self.initializer);
        let config = self.config.clone();
        let slot = Arc::downgrade(&self.slot);
        let progress = self.progress.clone();

        info!(
            attempt,
            backend = %config.backend,
            quantized = config.quantized,
            model_dir = %config.model_dir.display(),
            "initializing classifier"
        );

        async move {
            // A panic must not poison the shared future; it becomes a
            // failed attempt like any other.
            let result = AssertUnwindSafe(initializer.initialize(&config, progress.clone()))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(InitError::Engine(panic_message(&*payload))))
                .map(Arc::new);

            // The loader may have been dropped while the load was running.
            if let Some(slot) = slot.upgrade() {
                let mut slot = lock(&slot);
                match &result {
                    Ok(classifier) => {
                        *slot = Slot::Ready(Arc::clone(classifier));
                        progress.finish(LoadProgress::Ready);
                        info!(attempt, "classifier ready");
                    }
                    Err(e) => {
                        *slot = Slot::Failed(e.clone());
                        progress.finish(LoadProgress::Failed(e.to_string()));
                        warn!(attempt, error = %e, "classifier initialization failed");
                    }
                }
            }

            result
        }
        .boxed()
        .shared()
    }
}

fn lock<C>(slot: &Mutex<Slot<C>>) -> MutexGuard<'_, Slot<C>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned());
    match detail {
        Some(detail) => format!("initializer panicked: {detail}"),
        None => "initializer panicked".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeInitializer;
    use futures::StreamExt;
    use futures::future::join_all;

    fn loader(init: FakeInitializer) -> Loader<FakeInitializer> {
        Loader::new(init, EngineConfig::new("models/fake"))
    }

    #[tokio::test]
    async fn starts_uninitialized_and_loads_once() {
        let init = FakeInitializer::default();
        let calls = init.calls();
        let loader = loader(init);
        assert_eq!(loader.state(), LoaderState::Uninitialized);

        let first = loader.ensure_ready().await.unwrap();
        assert_eq!(loader.state(), LoaderState::Ready);

        let second = loader.ensure_ready().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(loader.attempts(), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_initialization() {
        let init = FakeInitializer::default().with_delay_ms(20);
        let calls = init.calls();
        let loader = loader(init);

        let results = join_all((0..10).map(|_| loader.ensure_ready())).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let handles: Vec<_> = results.into_iter().map(Result::unwrap).collect();
        for h in &handles[1..] {
            assert!(Arc::ptr_eq(&handles[0], h));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_tasks_share_one_initialization() {
        let init = FakeInitializer::default().with_delay_ms(50);
        let calls = init.calls();
        let loader = Arc::new(loader(init));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let loader = Arc::clone(&loader);
                tokio::spawn(async move { loader.ensure_ready().await.is_ok() })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(loader.state(), LoaderState::Ready);
    }

    #[tokio::test]
    async fn waiters_share_the_same_failure() {
        let init = FakeInitializer::default()
            .with_delay_ms(20)
            .failing_first(1);
        let calls = init.calls();
        let loader = loader(init);

        let results = join_all((0..5).map(|_| loader.ensure_ready())).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for r in &results {
            let err = r.as_ref().err().expect("all waiters should fail");
            assert_eq!(err.to_string(), "engine initialization failed: attempt 1 failed");
        }
        assert_eq!(loader.state(), LoaderState::Failed);
        assert!(loader.last_error().is_some());
    }

    #[tokio::test]
    async fn retries_after_failure() {
        let init = FakeInitializer::default().failing_first(1);
        let calls = init.calls();
        let loader = loader(init);

        assert!(loader.ensure_ready().await.is_err());
        assert_eq!(loader.state(), LoaderState::Failed);

        assert!(loader.ensure_ready().await.is_ok());
        assert_eq!(loader.state(), LoaderState::Ready);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(loader.last_error().is_none());
    }

    #[tokio::test]
    async fn reports_loading_while_in_flight() {
        let init = FakeInitializer::default().with_delay_ms(50);
        let loader = loader(init);

        let handle = loader.preload();
        assert_eq!(loader.state(), LoaderState::Loading);

        assert!(handle.await.unwrap().is_ok());
        assert_eq!(loader.state(), LoaderState::Ready);
    }

    #[tokio::test]
    async fn preload_and_ensure_ready_share_the_load() {
        let init = FakeInitializer::default().with_delay_ms(20);
        let calls = init.calls();
        let loader = loader(init);

        let handle = loader.preload();
        let direct = loader.ensure_ready().await.unwrap();
        let background = handle.await.unwrap().unwrap();

        assert!(Arc::ptr_eq(&direct, &background));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn progress_is_relayed_in_order() {
        let init = FakeInitializer::default().with_stages(&[
            ("initiate", Some("tokenizer.json")),
            ("done", Some("tokenizer.json")),
            ("initiate", Some("model_quantized.onnx")),
            ("done", Some("model_quantized.onnx")),
        ]);
        let loader = loader(init);
        let stream = loader.subscribe();

        loader.ensure_ready().await.unwrap();
        let events: Vec<String> = stream.map(|e| e.to_string()).collect().await;

        assert_eq!(
            events,
            [
                "initiate tokenizer.json",
                "done tokenizer.json",
                "initiate model_quantized.onnx",
                "done model_quantized.onnx",
                "Model ready.",
            ]
        );
    }

    #[tokio::test]
    async fn failed_load_ends_progress_with_failure() {
        let init = FakeInitializer::default()
            .with_stages(&[("initiate", None)])
            .failing_first(1);
        let loader = loader(init);
        let stream = loader.subscribe();

        assert!(loader.ensure_ready().await.is_err());
        let events: Vec<LoadProgress> = stream.collect().await;

        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            LoadProgress::Failed("engine initialization failed: attempt 1 failed".into())
        );
    }

    #[tokio::test]
    async fn subscribe_after_ready_yields_ready_only() {
        let loader = loader(FakeInitializer::default());
        loader.ensure_ready().await.unwrap();

        let events: Vec<LoadProgress> = loader.subscribe().collect().await;
        assert_eq!(events, [LoadProgress::Ready]);
    }

    #[tokio::test]
    async fn panicking_initializer_fails_and_can_retry() {
        let init = FakeInitializer::default().panicking_first(1);
        let calls = init.calls();
        let loader = loader(init);

        let err = loader.ensure_ready().await.err().unwrap();
        assert_eq!(
            err.to_string(),
            "engine initialization failed: initializer panicked: attempt 1 blew up"
        );
        assert_eq!(loader.state(), LoaderState::Failed);
        assert_eq!(
            loader.last_error().map(|e| e.to_string()),
            Some(err.to_string())
        );

        assert!(loader.ensure_ready().await.is_ok());
        assert_eq!(loader.state(), LoaderState::Ready);
        assert_eq!(loader.attempts(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn subscriber_after_failure_sees_the_retry() {
        let init = FakeInitializer::default()
            .with_stages(&[("initiate", Some("model.onnx")), ("done", Some("model.onnx"))])
            .failing_first(1);
        let loader = loader(init);

        let first = loader.subscribe();
        assert!(loader.ensure_ready().await.is_err());
        assert_eq!(first.collect::<Vec<_>>().await.len(), 3);
        assert_eq!(loader.state(), LoaderState::Failed);

        let retry = loader.subscribe();
        loader.ensure_ready().await.unwrap();
        let events: Vec<String> = retry.map(|e| e.to_string()).collect().await;

        assert_eq!(
            events,
            ["initiate model.onnx", "done model.onnx", "Model ready."]
        );
    }
}
