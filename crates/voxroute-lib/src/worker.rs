//! Startup: turn a [`WorkerConfig`] into a ready dispatcher.
//!
//! Engines are loaded one after another before anything is served. The
//! first failure aborts startup; a partially loaded registry is never
//! returned.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use voxroute_core::admission::AdmissionPolicy;
use voxroute_core::config::WorkerConfig;
use voxroute_core::error::{WorkerError, WorkerResult};
use voxroute_core::types::RegistryMode;

use crate::dispatcher::RequestDispatcher;
use crate::engine::{self, EngineFactory};
use crate::registry::{ModelRegistry, RegistryBuilder};
use crate::scratch::ScratchSpace;
use crate::service::SynthesisService;

/// A fully loaded worker.
pub struct Worker {
    pub dispatcher: RequestDispatcher,
    pub admission: AdmissionPolicy,
}

impl Worker {
    /// Load every configured engine with the configured backend.
    pub async fn start(config: &WorkerConfig) -> WorkerResult<Self> {
        let factory = engine::factory_for(config);
        Self::start_with(config, factory.as_ref()).await
    }

    /// Load every configured engine through `factory`.
    pub async fn start_with(
        config: &WorkerConfig,
        factory: &dyn EngineFactory,
    ) -> WorkerResult<Self> {
        config.validate()?;

        let device = config.device.resolve();
        let t0 = Instant::now();
        info!(mode = ?config.mode, %device, "loading engines");

        let mut builder = match config.mode {
            RegistryMode::PerLanguage => RegistryBuilder::per_language(device),
            RegistryMode::Multilingual => {
                RegistryBuilder::multilingual(device, config.allowed_languages.iter().cloned())
            }
        };
        for (key, model) in config.model_entries() {
            builder.register(key, &model, factory).await?;
        }
        let registry = Arc::new(builder.build()?);

        let scratch = ScratchSpace::new(config.scratch_dir.clone()).map_err(|e| {
            WorkerError::startup("-", "-", format!("scratch directory unusable: {e}"))
        })?;

        let admission = config.admission(device);
        info!(
            engines = registry.len(),
            scratch = %scratch.dir().display(),
            recommended_concurrency = admission.recommend_concurrency(0),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "worker ready"
        );

        let service = SynthesisService::new(registry, scratch);
        let dispatcher = RequestDispatcher::new(service, config.default_language.clone())
            .include_model(config.include_model);

        Ok(Self {
            dispatcher,
            admission,
        })
    }

    pub fn registry(&self) -> &ModelRegistry {
        self.dispatcher.service().registry()
    }
}
