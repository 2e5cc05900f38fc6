//! Language → engine registry.
//!
//! Built once during startup with [`RegistryBuilder`], frozen into a
//! [`ModelRegistry`] and shared behind an `Arc`. There is no way to add,
//! replace or evict a handle afterwards.

use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

use voxroute_core::LanguageKey;
use voxroute_core::error::{WorkerError, WorkerResult};
use voxroute_core::types::{Device, RegistryMode};

use crate::engine::{EngineFactory, EngineHandle};

enum Routes {
    PerLanguage(BTreeMap<LanguageKey, EngineHandle>),
    Multilingual {
        handle: EngineHandle,
        /// Empty accepts any well-formed key.
        allowed: BTreeSet<LanguageKey>,
    },
}

/// A handle selected for one request.
#[derive(Debug)]
pub struct Resolved<'a> {
    pub handle: &'a EngineHandle,
    /// Whether the engine expects the language as a parameter.
    pub pass_language: bool,
}

pub struct ModelRegistry {
    device: Device,
    routes: Routes,
}

impl ModelRegistry {
    /// Select the engine for `key`.
    ///
    /// Per-language registries require an exact match. A multilingual
    /// registry always returns its single engine once `key` passes the
    /// allow-set.
    pub fn resolve(&self, key: &LanguageKey) -> WorkerResult<Resolved<'_>> {
        match &self.routes {
            Routes::PerLanguage(handles) => handles
                .get(key)
                .map(|handle| Resolved {
                    handle,
                    pass_language: false,
                })
                .ok_or_else(|| WorkerError::UnsupportedLanguage(key.to_string())),
            Routes::Multilingual { handle, allowed } => {
                if allowed.is_empty() || allowed.contains(key) {
                    Ok(Resolved {
                        handle,
                        pass_language: true,
                    })
                } else {
                    Err(WorkerError::UnsupportedLanguage(key.to_string()))
                }
            }
        }
    }

    pub fn mode(&self) -> RegistryMode {
        match self.routes {
            Routes::PerLanguage(_) => RegistryMode::PerLanguage,
            Routes::Multilingual { .. } => RegistryMode::Multilingual,
        }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Languages that resolve. Empty for a multilingual registry without an
    /// allow-set, since any key is accepted.
    pub fn languages(&self) -> Vec<LanguageKey> {
        match &self.routes {
            Routes::PerLanguage(handles) => handles.keys().cloned().collect(),
            Routes::Multilingual { allowed, .. } => allowed.iter().cloned().collect(),
        }
    }

    pub fn handles(&self) -> Vec<&EngineHandle> {
        match &self.routes {
            Routes::PerLanguage(handles) => handles.values().collect(),
            Routes::Multilingual { handle, .. } => vec![handle],
        }
    }

    pub fn len(&self) -> usize {
        self.handles().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("mode", &self.mode())
            .field("device", &self.device)
            .field("handles", &self.handles())
            .finish()
    }
}

/// Collects loaded engines during startup.
pub struct RegistryBuilder {
    device: Device,
    mode: RegistryMode,
    allowed: BTreeSet<LanguageKey>,
    handles: BTreeMap<LanguageKey, EngineHandle>,
}

impl RegistryBuilder {
    pub fn per_language(device: Device) -> Self {
        Self {
            device,
            mode: RegistryMode::PerLanguage,
            allowed: BTreeSet::new(),
            handles: BTreeMap::new(),
        }
    }

    pub fn multilingual(device: Device, allowed: impl IntoIterator<Item = LanguageKey>) -> Self {
        Self {
            device,
            mode: RegistryMode::Multilingual,
            allowed: allowed.into_iter().collect(),
            handles: BTreeMap::new(),
        }
    }

    /// Load `model_id` through `factory` and store it under `key`.
    ///
    /// Any failure is a startup failure; the caller is expected to abort.
    pub async fn register(
        &mut self,
        key: LanguageKey,
        model_id: &str,
        factory: &dyn EngineFactory,
    ) -> WorkerResult<()> {
        if self.handles.contains_key(&key) {
            return Err(WorkerError::startup(key.as_str(), model_id, "language registered twice"));
        }
        if self.mode == RegistryMode::Multilingual && !self.handles.is_empty() {
            return Err(WorkerError::startup(
                key.as_str(),
                model_id,
                "multilingual registry holds exactly one engine",
            ));
        }

        let engine = factory
            .load(model_id, self.device)
            .await
            .map_err(|e| WorkerError::startup(key.as_str(), model_id, e.to_string()))?;

        let handle = EngineHandle::new(key.clone(), self.device, engine);
        info!(
            language = %key,
            model = handle.model_id(),
            device = %self.device,
            serialized = handle.is_serialized(),
            "engine ready"
        );
        self.handles.insert(key, handle);
        Ok(())
    }

    /// Freeze the registry. At least one engine must have been registered.
    pub fn build(mut self) -> WorkerResult<ModelRegistry> {
        let routes = match self.mode {
            RegistryMode::PerLanguage => {
                if self.handles.is_empty() {
                    return Err(WorkerError::startup("-", "-", "no engines registered"));
                }
                Routes::PerLanguage(self.handles)
            }
            RegistryMode::Multilingual => match self.handles.pop_first() {
                Some((_, handle)) => Routes::Multilingual {
                    handle,
                    allowed: self.allowed,
                },
                None => return Err(WorkerError::startup("-", "-", "no engines registered")),
            },
        };
        Ok(ModelRegistry {
            device: self.device,
            routes,
        })
    }
}
