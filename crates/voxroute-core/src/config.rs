//! Worker configuration.
//!
//! Loaded from an optional JSON file and then overridden by CLI flags.
//! Defaults reproduce the stock two-language Coqui worker: English VITS and
//! Arabic Tacotron2 driven through the `tts` command-line tool.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::admission::AdmissionPolicy;
use crate::error::ConfigError;
use crate::language::LanguageKey;
use crate::types::{CostClass, Device, DevicePreference, RegistryMode};

/// Engine backend used for every registered model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EngineConfig {
    /// Run an external synthesis program once per request.
    ///
    /// `args` may contain `{text}`, `{model}`, `{out}` and `{language}`
    /// placeholders. `language_args` are appended only when the engine is
    /// handed a language (multilingual mode), `gpu_args` only on an
    /// accelerated device.
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        language_args: Vec<String>,
        #[serde(default)]
        gpu_args: Vec<String>,
    },
    /// POST to an OpenAI-compatible `/v1/audio/speech` server.
    Http {
        url: String,
        #[serde(default)]
        voice: Option<String>,
        #[serde(default)]
        concurrency_safe: bool,
    },
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::Command {
            program: "tts".into(),
            // Joined `--flag=value` so text starting with `-` is not read as an option
            args: ["--text={text}", "--model_name={model}", "--out_path={out}"]
                .map(String::from)
                .to_vec(),
            language_args: vec!["--language_idx={language}".to_string()],
            gpu_args: ["--use_cuda", "true"].map(String::from).to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    pub mode: RegistryMode,
    /// Per-language mode: language → model identifier.
    pub models: BTreeMap<LanguageKey, String>,
    /// Multilingual mode: the single model identifier.
    pub multilingual_model: Option<String>,
    /// Multilingual mode: languages the model accepts. Empty accepts any.
    pub allowed_languages: Vec<LanguageKey>,
    pub default_language: LanguageKey,
    pub device: DevicePreference,
    /// Overrides the cost class implied by `mode`.
    pub cost: Option<CostClass>,
    /// Overrides the admission table.
    pub max_concurrency: Option<usize>,
    /// Report the serving model identifier in success envelopes.
    pub include_model: bool,
    /// Where engines write their artifacts. System temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
    pub engine: EngineConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let mut models = BTreeMap::new();
        models.insert(LanguageKey::default(), "tts_models/en/vctk/vits".to_string());
        if let Ok(ar) = LanguageKey::parse("ar") {
            models.insert(ar, "tts_models/ar/mai/tacotron2-DDC".to_string());
        }
        Self {
            mode: RegistryMode::PerLanguage,
            models,
            multilingual_model: None,
            allowed_languages: Vec::new(),
            default_language: LanguageKey::default(),
            device: DevicePreference::Auto,
            cost: None,
            max_concurrency: None,
            include_model: false,
            scratch_dir: None,
            engine: EngineConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check the cross-field rules that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.mode {
            RegistryMode::PerLanguage => {
                if self.models.is_empty() {
                    return Err(ConfigError::Invalid("no models configured".into()));
                }
                if let Some((key, _)) = self.models.iter().find(|(_, m)| m.trim().is_empty()) {
                    return Err(ConfigError::Invalid(format!("empty model name for {key}")));
                }
                if !self.models.contains_key(&self.default_language) {
                    return Err(ConfigError::Invalid(format!(
                        "default language {} has no model",
                        self.default_language
                    )));
                }
            }
            RegistryMode::Multilingual => {
                match self.multilingual_model.as_deref().map(str::trim) {
                    None | Some("") => {
                        return Err(ConfigError::Invalid(
                            "multilingual mode requires multilingual_model".into(),
                        ));
                    }
                    Some(_) => {}
                }
                if !self.allowed_languages.is_empty()
                    && !self.allowed_languages.contains(&self.default_language)
                {
                    return Err(ConfigError::Invalid(format!(
                        "default language {} is not in allowed_languages",
                        self.default_language
                    )));
                }
            }
        }

        if self.max_concurrency == Some(0) {
            return Err(ConfigError::Invalid("max_concurrency must be at least 1".into()));
        }

        match &self.engine {
            EngineConfig::Command { program, .. } if program.trim().is_empty() => {
                Err(ConfigError::Invalid("engine program is empty".into()))
            }
            EngineConfig::Http { url, .. } if !url.starts_with("http") => {
                Err(ConfigError::Invalid(format!("engine url '{url}' is not http(s)")))
            }
            _ => Ok(()),
        }
    }

    /// `(key, model)` pairs to load, in load order.
    pub fn model_entries(&self) -> Vec<(LanguageKey, String)> {
        match self.mode {
            RegistryMode::PerLanguage => self
                .models
                .iter()
                .map(|(k, m)| (k.clone(), m.clone()))
                .collect(),
            RegistryMode::Multilingual => self
                .multilingual_model
                .iter()
                .map(|m| (LanguageKey::multi(), m.clone()))
                .collect(),
        }
    }

    pub fn cost_class(&self) -> CostClass {
        self.cost.unwrap_or_else(|| self.mode.default_cost())
    }

    pub fn admission(&self, device: Device) -> AdmissionPolicy {
        AdmissionPolicy::new(device, self.cost_class()).with_override(self.max_concurrency)
    }
}
