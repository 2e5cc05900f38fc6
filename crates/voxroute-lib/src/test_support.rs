//! Stub engines for unit tests.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use voxroute_core::LanguageKey;
use voxroute_core::types::Device;
use voxroute_core::wav::encode_pcm16;

use crate::engine::{EngineError, EngineFactory, SpeechEngine};

/// Deterministic WAV for `text`: one sample per byte, tagged with `model`.
pub fn marker_wav(model: &str, text: &str, language: Option<&LanguageKey>) -> Vec<u8> {
    let tag = format!("{model}|{}|{text}", language.map(LanguageKey::as_str).unwrap_or("-"));
    let samples: Vec<i16> = tag.bytes().map(i16::from).collect();
    encode_pcm16(&samples, 16_000)
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Ok,
    Fail,
    Panic,
    NotWav,
}

pub struct StubEngine {
    pub model: String,
    pub behavior: Behavior,
    pub safe: bool,
    pub delay: Duration,
    pub calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub seen_language: std::sync::Mutex<Vec<Option<String>>>,
}

impl StubEngine {
    fn build(model: &str, behavior: Behavior, safe: bool, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            model: model.to_string(),
            behavior,
            safe,
            delay,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            seen_language: std::sync::Mutex::new(Vec::new()),
        })
    }

    pub fn new(model: &str, behavior: Behavior) -> Arc<Self> {
        Self::build(model, behavior, true, Duration::ZERO)
    }

    /// Not concurrency-safe and slow enough for calls to overlap.
    pub fn unsafe_slow(model: &str, delay: Duration) -> Arc<Self> {
        Self::build(model, Behavior::Ok, false, delay)
    }

    pub fn safe_slow(model: &str, delay: Duration) -> Arc<Self> {
        Self::build(model, Behavior::Ok, true, delay)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechEngine for StubEngine {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn concurrency_safe(&self) -> bool {
        self.safe
    }

    async fn synthesize_to(
        &self,
        text: &str,
        language: Option<&LanguageKey>,
        out: &Path,
    ) -> Result<(), EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_language
            .lock()
            .unwrap()
            .push(language.map(|l| l.to_string()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.behavior {
            Behavior::Ok => {
                tokio::fs::write(out, marker_wav(&self.model, text, language)).await?;
                Ok(())
            }
            Behavior::Fail => Err(EngineError::Failed("stub engine failure".into())),
            Behavior::Panic => panic!("stub engine panicked"),
            Behavior::NotWav => {
                tokio::fs::write(out, b"ID3 not a wav at all").await?;
                Ok(())
            }
        }
    }
}

/// Hands out pre-built engines by model id; unknown ids fail to load.
pub struct StubFactory {
    pub engines: Vec<Arc<StubEngine>>,
}

#[async_trait]
impl EngineFactory for StubFactory {
    async fn load(
        &self,
        model_id: &str,
        _device: Device,
    ) -> Result<Arc<dyn SpeechEngine>, EngineError> {
        self.engines
            .iter()
            .find(|e| e.model == model_id)
            .map(|e| e.clone() as Arc<dyn SpeechEngine>)
            .ok_or_else(|| EngineError::Unavailable(format!("no stub for {model_id}")))
    }
}

pub fn key(s: &str) -> LanguageKey {
    LanguageKey::parse(s).unwrap()
}
