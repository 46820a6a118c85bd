// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Recognition engine adapter. Owns the single engine instance.
//
// The engine is built lazily on first use (at most once; a failed attempt is
// retried on the next call) and every call runs under one async mutex, so
// concurrent callers queue for their turn. Blocking engine work happens on the
// blocking thread pool with the mutex guard moved into the task.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use textgrab_core::config::EngineConfig;
use textgrab_core::error::{Result, TextgrabError};
use textgrab_core::types::{ImageBuffer, RecognitionParams, RecognitionResult};
use tokio::sync::{Mutex, OnceCell, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

use crate::engine::{EngineFactory, RecognitionEngine, factory_for};

type EngineSlot = Option<Box<dyn RecognitionEngine>>;

/// Serialised access to one lazily-created recognition engine.
pub struct EngineAdapter {
    factory: EngineFactory,
    /// Applied under every pass's overrides.
    baseline: RecognitionParams,
    engine: OnceCell<Arc<Mutex<EngineSlot>>>,
    shut_down: AtomicBool,
}

impl EngineAdapter {
    pub fn new(factory: EngineFactory, baseline: RecognitionParams) -> Self {
        Self {
            factory,
            baseline,
            engine: OnceCell::new(),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Adapter for the backend named in `config`.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(factory_for(config), config.baseline.clone())
    }

    pub fn baseline(&self) -> &RecognitionParams {
        &self.baseline
    }

    /// Whether the engine has been created (and not yet shut down).
    pub fn is_initialized(&self) -> bool {
        self.engine.initialized() && !self.shut_down.load(Ordering::Acquire)
    }

    // -- Operations -----------------------------------------------------------

    /// Apply parameter overrides to the engine.
    ///
    /// A rejected parameter is logged and the engine keeps its previous
    /// values; only a missing engine is an error. The settings last until the
    /// next [`run_pass`](Self::run_pass), which re-applies the baseline with
    /// its own overrides; use [`recognize`](Self::recognize) to run with them.
    pub async fn configure(&self, params: RecognitionParams) -> Result<()> {
        let guard = self.lock_engine().await?;
        run_blocking(move || {
            let mut guard = guard;
            let engine = engine_mut(&mut guard)?;
            apply_params(engine.as_mut(), &params);
            Ok(())
        })
        .await
    }

    /// Recognise text with whatever parameters are currently active.
    pub async fn recognize(&self, image: &ImageBuffer) -> Result<RecognitionResult> {
        let guard = self.lock_engine().await?;
        let image = image.clone();
        run_blocking(move || {
            let mut guard = guard;
            engine_mut(&mut guard)?.recognize(&image)
        })
        .await
    }

    /// One recognition pass with its own parameters.
    ///
    /// The baseline merged with `overrides` is applied and the image
    /// recognised inside a single critical section, so parameters from
    /// concurrent calls never interleave. An absent whitelist clears any
    /// restriction left behind by an earlier pass.
    #[instrument(skip_all, fields(psm = ?overrides.segmentation_mode))]
    pub async fn run_pass(
        &self,
        image: &ImageBuffer,
        overrides: &RecognitionParams,
    ) -> Result<RecognitionResult> {
        let mut params = overrides.merged_over(&self.baseline);
        params.character_whitelist.get_or_insert_with(String::new);

        let guard = self.lock_engine().await?;
        let image = image.clone();
        run_blocking(move || {
            let mut guard = guard;
            let engine = engine_mut(&mut guard)?;
            apply_params(engine.as_mut(), &params);
            engine.recognize(&image)
        })
        .await
    }

    /// Release the engine. Later calls fail with
    /// [`TextgrabError::EngineUnavailable`]; the engine is never rebuilt.
    ///
    /// An engine still being created when this runs is released by the call
    /// that created it, before that call reaches the engine.
    pub async fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        let Some(slot) = self.engine.get() else {
            debug!("Engine shutdown requested before initialisation");
            return;
        };
        release(&mut *slot.lock().await);
    }

    // -- Internals ------------------------------------------------------------

    async fn lock_engine(&self) -> Result<OwnedMutexGuard<EngineSlot>> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(shut_down_error());
        }
        let slot = self
            .engine
            .get_or_try_init(|| async {
                let factory = Arc::clone(&self.factory);
                let engine = run_blocking(move || factory()).await.inspect_err(|err| {
                    warn!(error = %err, "Recognition engine initialisation failed");
                })?;
                info!(engine = engine.name(), "Recognition engine initialised");
                Ok::<_, TextgrabError>(Arc::new(Mutex::new(Some(engine))))
            })
            .await?;
        let mut guard = Arc::clone(slot).lock_owned().await;
        // Shutdown may have landed while the factory or a queued pass ran.
        if self.shut_down.load(Ordering::Acquire) {
            release(&mut guard);
            return Err(shut_down_error());
        }
        Ok(guard)
    }
}

fn release(slot: &mut EngineSlot) {
    if let Some(engine) = slot.take() {
        info!(engine = engine.name(), "Recognition engine shut down");
    }
}

fn engine_mut(guard: &mut OwnedMutexGuard<EngineSlot>) -> Result<&mut Box<dyn RecognitionEngine>> {
    guard.as_mut().ok_or_else(shut_down_error)
}

fn shut_down_error() -> TextgrabError {
    TextgrabError::EngineUnavailable("recognition engine has been shut down".into())
}

fn apply_params(engine: &mut dyn RecognitionEngine, params: &RecognitionParams) {
    if let Err(err) = engine.configure(params) {
        warn!(
            engine = engine.name(),
            error = %err,
            class = ?err.class(),
            "Engine rejected parameters, continuing with the active ones"
        );
    }
}

/// Run `f` on the blocking pool, folding a panicked task into a recognition
/// error.
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| TextgrabError::Recognition(format!("engine task failed: {err}")))?
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use textgrab_core::types::SegmentationMode;

    use super::*;
    use crate::testing::{ScriptedEngine, pass, sample_image, unavailable_factory};

    fn baseline() -> RecognitionParams {
        RecognitionParams {
            segmentation_mode: Some(SegmentationMode::Auto),
            preserve_interword_spaces: Some(true),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn engine_is_created_lazily_and_once() {
        let (factory, probe) =
            ScriptedEngine::new([pass("a", &[90.0]), pass("b", &[90.0])]).into_factory();
        let adapter = EngineAdapter::new(factory, baseline());
        assert!(!adapter.is_initialized());
        assert_eq!(probe.created(), 0);

        let image = sample_image();
        assert_eq!(adapter.recognize(&image).await.unwrap().full_text, "a");
        assert_eq!(adapter.recognize(&image).await.unwrap().full_text, "b");
        assert_eq!(probe.created(), 1);
        assert!(adapter.is_initialized());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_passes_are_serialised() {
        let engine = ScriptedEngine::empty().with_delay(Duration::from_millis(15));
        let (factory, probe) = engine.into_factory();
        let adapter = Arc::new(EngineAdapter::new(factory, baseline()));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let adapter = Arc::clone(&adapter);
            tasks.push(tokio::spawn(async move {
                adapter
                    .run_pass(&sample_image(), &RecognitionParams::default())
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(probe.created(), 1);
        assert_eq!(probe.recognitions(), 8);
        assert_eq!(probe.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn run_pass_applies_merged_params_and_clears_whitelist() {
        let (factory, probe) = ScriptedEngine::empty().into_factory();
        let adapter = EngineAdapter::new(factory, baseline());
        let image = sample_image();

        let numeric = RecognitionParams {
            segmentation_mode: Some(SegmentationMode::SingleLine),
            character_whitelist: Some("0123456789".into()),
            ..Default::default()
        };
        adapter.run_pass(&image, &numeric).await.unwrap();
        adapter.run_pass(&image, &RecognitionParams::default()).await.unwrap();

        let seen = probe.configured();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].segmentation_mode, Some(SegmentationMode::SingleLine));
        assert_eq!(seen[0].character_whitelist.as_deref(), Some("0123456789"));
        assert_eq!(seen[0].preserve_interword_spaces, Some(true));
        assert_eq!(seen[1].segmentation_mode, Some(SegmentationMode::Auto));
        assert_eq!(seen[1].character_whitelist.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn rejected_configuration_does_not_fail_the_pass() {
        let engine = ScriptedEngine::new([pass("still works", &[80.0, 80.0])])
            .rejecting_configuration();
        let (factory, _probe) = engine.into_factory();
        let adapter = EngineAdapter::new(factory, baseline());

        adapter.configure(RecognitionParams::default()).await.unwrap();
        let result = adapter
            .run_pass(&sample_image(), &RecognitionParams::default())
            .await
            .unwrap();
        assert_eq!(result.full_text, "still works");
    }

    #[tokio::test]
    async fn configure_lasts_until_the_next_pass() {
        let (factory, probe) = ScriptedEngine::empty().into_factory();
        let adapter = EngineAdapter::new(factory, baseline());
        let digits = RecognitionParams {
            segmentation_mode: Some(SegmentationMode::SingleWord),
            character_whitelist: Some("0123456789".into()),
            ..Default::default()
        };
        adapter.configure(digits).await.unwrap();
        adapter.recognize(&sample_image()).await.unwrap();
        adapter.run_pass(&sample_image(), &RecognitionParams::default()).await.unwrap();

        let seen = probe.configured();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].segmentation_mode, Some(SegmentationMode::SingleWord));
        assert_eq!(seen[1].segmentation_mode, Some(SegmentationMode::Auto));
        assert_eq!(seen[1].character_whitelist.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn failed_initialisation_is_retried_next_call() {
        let adapter = EngineAdapter::new(unavailable_factory(), baseline());
        for _ in 0..2 {
            let err = adapter.recognize(&sample_image()).await.unwrap_err();
            assert!(matches!(err, TextgrabError::EngineUnavailable(_)));
        }
        assert!(!adapter.is_initialized());
    }

    #[tokio::test]
    async fn shutdown_releases_the_engine() {
        let (factory, probe) = ScriptedEngine::empty().into_factory();
        let adapter = EngineAdapter::new(factory, baseline());
        adapter.recognize(&sample_image()).await.unwrap();

        adapter.shutdown().await;
        assert!(!adapter.is_initialized());
        let err = adapter.recognize(&sample_image()).await.unwrap_err();
        assert!(matches!(err, TextgrabError::EngineUnavailable(_)));
        assert_eq!(probe.created(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_during_slow_creation_releases_the_engine() {
        let (factory, probe) = ScriptedEngine::empty()
            .with_startup_delay(Duration::from_millis(200))
            .into_factory();
        let adapter = Arc::new(EngineAdapter::new(factory, baseline()));

        let in_flight = {
            let adapter = Arc::clone(&adapter);
            tokio::spawn(async move { adapter.recognize(&sample_image()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        adapter.shutdown().await;

        let err = in_flight.await.unwrap().unwrap_err();
        assert!(matches!(err, TextgrabError::EngineUnavailable(_)));
        assert_eq!(probe.created(), 1);
        assert_eq!(probe.recognitions(), 0);
        assert_eq!(probe.released(), 1);
        assert!(adapter.recognize(&sample_image()).await.is_err());
    }

    #[tokio::test]
    async fn shutdown_before_first_use_prevents_creation() {
        let (factory, probe) = ScriptedEngine::empty().into_factory();
        let adapter = EngineAdapter::new(factory, baseline());
        adapter.shutdown().await;
        assert!(adapter.run_pass(&sample_image(), &RecognitionParams::default()).await.is_err());
        assert_eq!(probe.created(), 0);
    }
}
