//! Synthesis engines and the handles the registry keeps for them.
//!
//! An engine is a black box that turns text into a WAV file at a path it is
//! given. Whether it tolerates concurrent calls is declared by the engine
//! itself; handles for engines that do not are gated so only one call is in
//! flight per handle.

pub mod command;
pub mod http;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use voxroute_core::LanguageKey;
use voxroute_core::config::{EngineConfig, WorkerConfig};
use voxroute_core::types::{Device, RegistryMode};
use voxroute_core::wav::parse_wav_header;

pub use command::CommandEngineFactory;
pub use http::HttpEngineFactory;

/// Text synthesized once per engine at startup.
pub const WARMUP_TEXT: &str = "Ready.";

/// Errors raised by engine adapters.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine cannot be used at all (missing program, unreachable server).
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    /// The engine ran and reported failure.
    #[error("{0}")]
    Failed(String),

    #[error("artifact I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("engine request: {0}")]
    Http(#[from] reqwest::Error),
}

/// A loaded text-to-speech model.
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Identifier of the model this engine serves.
    fn model_id(&self) -> &str;

    /// Whether two calls may run on this engine at the same time.
    fn concurrency_safe(&self) -> bool {
        false
    }

    /// Synthesize `text` into a WAV file at `out`.
    ///
    /// `language` is only passed to multilingual engines.
    async fn synthesize_to(
        &self,
        text: &str,
        language: Option<&LanguageKey>,
        out: &Path,
    ) -> Result<(), EngineError>;
}

/// Loads engines at startup.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn load(
        &self,
        model_id: &str,
        device: Device,
    ) -> Result<Arc<dyn SpeechEngine>, EngineError>;
}

/// Build the factory described by the worker configuration.
///
/// Multilingual engines are warmed up with the default language; per-language
/// engines never receive one.
pub fn factory_for(config: &WorkerConfig) -> Box<dyn EngineFactory> {
    let warmup_language = match config.mode {
        RegistryMode::PerLanguage => None,
        RegistryMode::Multilingual => Some(config.default_language.clone()),
    };
    match &config.engine {
        EngineConfig::Command {
            program,
            args,
            language_args,
            gpu_args,
        } => Box::new(
            CommandEngineFactory::new(
                program.clone(),
                args.clone(),
                language_args.clone(),
                gpu_args.clone(),
            )
            .with_warmup_language(warmup_language),
        ),
        EngineConfig::Http {
            url,
            voice,
            concurrency_safe,
        } => Box::new(
            HttpEngineFactory::new(url.clone(), voice.clone(), *concurrency_safe)
                .with_warmup_language(warmup_language),
        ),
    }
}

/// Run one short synthesis and check that it produced a WAV file.
///
/// Factories call this from `load` so a model that cannot synthesize fails
/// startup instead of every request.
pub(crate) async fn warm_up(
    engine: &dyn SpeechEngine,
    language: Option<&LanguageKey>,
) -> Result<(), EngineError> {
    let out = tempfile::Builder::new()
        .prefix("voxroute-warmup-")
        .suffix(".wav")
        .tempfile()?
        .into_temp_path();

    engine
        .synthesize_to(WARMUP_TEXT, language, &out)
        .await
        .map_err(|e| EngineError::Unavailable(format!("warm-up synthesis failed: {e}")))?;
    let audio = tokio::fs::read(&out).await?;
    parse_wav_header(&audio)
        .map_err(|e| EngineError::Unavailable(format!("warm-up output is not WAV: {e}")))?;
    Ok(())
}

/// One loaded engine bound to a device. Read-only once constructed.
pub struct EngineHandle {
    key: LanguageKey,
    device: Device,
    ready: bool,
    engine: Arc<dyn SpeechEngine>,
    // Present when the engine is not safe for concurrent calls.
    gate: Option<Mutex<()>>,
}

impl EngineHandle {
    pub(crate) fn new(key: LanguageKey, device: Device, engine: Arc<dyn SpeechEngine>) -> Self {
        let gate = (!engine.concurrency_safe()).then(|| Mutex::new(()));
        Self {
            key,
            device,
            ready: true,
            engine,
            gate,
        }
    }

    pub fn key(&self) -> &LanguageKey {
        &self.key
    }

    pub fn model_id(&self) -> &str {
        self.engine.model_id()
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_serialized(&self) -> bool {
        self.gate.is_some()
    }

    /// Run the engine, waiting for the gate first when the handle has one.
    pub async fn invoke(
        &self,
        text: &str,
        language: Option<&LanguageKey>,
        out: &Path,
    ) -> Result<(), EngineError> {
        let _permit = match &self.gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        };
        self.engine.synthesize_to(text, language, out).await
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("key", &self.key)
            .field("model", &self.model_id())
            .field("device", &self.device)
            .field("ready", &self.ready)
            .field("serialized", &self.is_serialized())
            .finish()
    }
}
