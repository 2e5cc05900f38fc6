//! Deterministic engines shared by the integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use voxroute_core::LanguageKey;
use voxroute_core::config::WorkerConfig;
use voxroute_core::types::{Device, DevicePreference};
use voxroute_core::wav::encode_pcm16;
use voxroute_lib::engine::{EngineError, EngineFactory, SpeechEngine};
use voxroute_lib::worker::Worker;

/// The WAV an [`EchoEngine`] produces: one sample per byte of `model:text`.
pub fn echo_wav(model: &str, text: &str) -> Vec<u8> {
    let samples: Vec<i16> = format!("{model}:{text}").bytes().map(i16::from).collect();
    encode_pcm16(&samples, 22_050)
}

/// Writes [`echo_wav`], after a short text-dependent delay. Panics on "boom".
pub struct EchoEngine {
    pub model: String,
    pub calls: AtomicUsize,
}

impl EchoEngine {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechEngine for EchoEngine {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn concurrency_safe(&self) -> bool {
        true
    }

    async fn synthesize_to(
        &self,
        text: &str,
        _language: Option<&LanguageKey>,
        out: &Path,
    ) -> Result<(), EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text == "boom" {
            panic!("engine exploded");
        }
        tokio::time::sleep(Duration::from_millis((text.len() % 7) as u64 * 3)).await;
        tokio::fs::write(out, echo_wav(&self.model, text)).await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct EchoFactory {
    pub loaded: std::sync::Mutex<BTreeMap<String, Arc<EchoEngine>>>,
}

impl EchoFactory {
    pub fn engine(&self, model: &str) -> Arc<EchoEngine> {
        self.loaded.lock().unwrap()[model].clone()
    }

    pub fn total_calls(&self) -> usize {
        self.loaded.lock().unwrap().values().map(|e| e.calls()).sum()
    }
}

#[async_trait]
impl EngineFactory for EchoFactory {
    async fn load(
        &self,
        model_id: &str,
        _device: Device,
    ) -> Result<Arc<dyn SpeechEngine>, EngineError> {
        let engine = Arc::new(EchoEngine {
            model: model_id.to_string(),
            calls: AtomicUsize::new(0),
        });
        self.loaded
            .lock()
            .unwrap()
            .insert(model_id.to_string(), engine.clone());
        Ok(engine)
    }
}

/// The stock en/ar worker, loaded with echo engines.
pub async fn echo_worker(scratch: &Path) -> (Worker, Arc<EchoFactory>) {
    let factory = Arc::new(EchoFactory::default());
    let config = WorkerConfig {
        device: DevicePreference::General,
        scratch_dir: Some(scratch.to_path_buf()),
        ..Default::default()
    };
    let worker = Worker::start_with(&config, factory.as_ref()).await.unwrap();
    (worker, factory)
}
