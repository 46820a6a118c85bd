// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory engine for adapter, retry and pipeline tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use textgrab_core::error::{Result, TextgrabError};
use textgrab_core::types::{ImageBuffer, RecognitionParams, RecognitionResult, WordResult};

use crate::engine::{EngineFactory, RecognitionEngine};

/// What the tests can observe about a scripted engine.
#[derive(Default)]
pub(crate) struct EngineProbe {
    pub created: AtomicUsize,
    pub recognitions: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub configured: Mutex<Vec<RecognitionParams>>,
    pub released: AtomicUsize,
}

impl EngineProbe {
    pub fn recognitions(&self) -> usize {
        self.recognitions.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn configured(&self) -> Vec<RecognitionParams> {
        self.configured.lock().unwrap().clone()
    }

    /// Created engines that have since been dropped.
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

/// Plays back a fixed sequence of pass results; empty results once the
/// script runs out.
pub(crate) struct ScriptedEngine {
    script: VecDeque<Result<RecognitionResult>>,
    probe: Arc<EngineProbe>,
    delay: Duration,
    startup_delay: Duration,
    reject_configuration: bool,
}

impl ScriptedEngine {
    pub fn new(script: impl IntoIterator<Item = Result<RecognitionResult>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            probe: Arc::new(EngineProbe::default()),
            delay: Duration::ZERO,
            startup_delay: Duration::ZERO,
            reject_configuration: false,
        }
    }

    /// An engine that only ever returns empty passes.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Hold each recognition for `delay` (to widen race windows).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make the factory take `delay` before handing out the engine.
    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    /// Fail every `configure` call.
    pub fn rejecting_configuration(mut self) -> Self {
        self.reject_configuration = true;
        self
    }

    pub fn probe(&self) -> Arc<EngineProbe> {
        Arc::clone(&self.probe)
    }

    /// A factory handing out this engine once.
    pub fn into_factory(self) -> (EngineFactory, Arc<EngineProbe>) {
        let probe = self.probe();
        let slot = Mutex::new(Some(self));
        let factory: EngineFactory = Arc::new(move || {
            let engine = slot
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| TextgrabError::EngineUnavailable("already created".into()))?;
            if !engine.startup_delay.is_zero() {
                std::thread::sleep(engine.startup_delay);
            }
            engine.probe.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(engine) as Box<dyn RecognitionEngine>)
        });
        (factory, probe)
    }
}

impl RecognitionEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn configure(&mut self, params: &RecognitionParams) -> Result<()> {
        if self.reject_configuration {
            return Err(TextgrabError::Configuration("scripted rejection".into()));
        }
        self.probe.configured.lock().unwrap().push(params.clone());
        Ok(())
    }

    fn recognize(&mut self, _image: &ImageBuffer) -> Result<RecognitionResult> {
        let now = self.probe.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.probe.recognitions.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.probe.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.script.pop_front().unwrap_or_else(|| Ok(RecognitionResult::default()))
    }
}

impl Drop for ScriptedEngine {
    fn drop(&mut self) {
        if self.probe.created() > 0 {
            self.probe.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// A pass result whose whitespace-separated words carry `confidences` in
/// order.
pub(crate) fn pass(text: &str, confidences: &[f32]) -> Result<RecognitionResult> {
    let words = text
        .split_whitespace()
        .zip(confidences)
        .map(|(word, &conf)| WordResult::new(word, conf))
        .collect();
    Ok(RecognitionResult::new(text, words))
}

/// A factory that always fails.
pub(crate) fn unavailable_factory() -> EngineFactory {
    Arc::new(|| Err(TextgrabError::EngineUnavailable("no backend in tests".into())))
}

/// A tiny PNG for pipeline tests.
pub(crate) fn sample_image() -> ImageBuffer {
    use image::{DynamicImage, Rgb, RgbImage};
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 10, Rgb([250, 250, 250])));
    textgrab_image::ImageProcessor::from_dynamic(img)
        .to_png_buffer()
        .unwrap()
}
