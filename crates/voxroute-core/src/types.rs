//! Shared request, result and envelope types.
//!
//! Kept free of tokio and engine code so the CLI client and downstream
//! consumers can parse envelopes without pulling in the worker runtime.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::WorkerError;
use crate::language::LanguageKey;

/// Format tag carried by every success envelope.
pub const AUDIO_FORMAT: &str = "wav";

// ─── Device / cost ─────────────────────────────────────────────────────────

/// Hardware an engine is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Accelerated,
    General,
}

impl Device {
    pub fn is_accelerated(self) -> bool {
        matches!(self, Self::Accelerated)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accelerated => f.write_str("accelerated"),
            Self::General => f.write_str("general"),
        }
    }
}

/// Device requested in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    #[default]
    Auto,
    Accelerated,
    General,
}

impl DevicePreference {
    /// Resolve the preference to a concrete device.
    ///
    /// `Auto` picks `Accelerated` when an NVIDIA control node is present or
    /// `CUDA_VISIBLE_DEVICES` names at least one device.
    pub fn resolve(self) -> Device {
        match self {
            Self::Accelerated => Device::Accelerated,
            Self::General => Device::General,
            Self::Auto => {
                let visible = std::env::var("CUDA_VISIBLE_DEVICES").ok();
                if accelerator_present(visible.as_deref(), Path::new("/dev/nvidiactl")) {
                    Device::Accelerated
                } else {
                    Device::General
                }
            }
        }
    }
}

impl std::str::FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "accelerated" | "gpu" | "cuda" => Ok(Self::Accelerated),
            "general" | "cpu" => Ok(Self::General),
            _ => Err(format!("unknown device '{s}'; expected auto, accelerated or general")),
        }
    }
}

fn accelerator_present(cuda_visible_devices: Option<&str>, control_node: &Path) -> bool {
    match cuda_visible_devices.map(str::trim) {
        // Explicitly hidden
        Some("") | Some("-1") | Some("none") => false,
        Some(_) => true,
        None => control_node.exists(),
    }
}

/// Model cost profile used by the admission policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostClass {
    /// Single-language, vocoder-class model.
    Light,
    /// Multilingual or autoregressive model.
    Heavy,
}

/// How the registry maps languages to engines. Fixed for a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryMode {
    /// One distinct engine per language, no fallback.
    #[default]
    PerLanguage,
    /// One engine accepting the language as a parameter.
    Multilingual,
}

impl RegistryMode {
    pub fn default_cost(self) -> CostClass {
        match self {
            Self::PerLanguage => CostClass::Light,
            Self::Multilingual => CostClass::Heavy,
        }
    }
}

// ─── Request / result ──────────────────────────────────────────────────────

/// A validated synthesis request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisRequest {
    pub text: String,
    pub language: LanguageKey,
}

impl SynthesisRequest {
    /// Build a request. Text must contain something besides whitespace.
    pub fn new(text: impl Into<String>, language: LanguageKey) -> Result<Self, WorkerError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(WorkerError::text_required());
        }
        Ok(Self { text, language })
    }
}

/// Raw audio produced for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisResult {
    pub audio: Vec<u8>,
    pub format: &'static str,
    pub language: LanguageKey,
    pub model: Option<String>,
}

// ─── Envelope ──────────────────────────────────────────────────────────────

/// Uniform response returned for every job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseEnvelope {
    Success {
        audio: String,
        format: String,
        language: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    Failure {
        error: String,
    },
}

impl ResponseEnvelope {
    /// Encode a result. The model identifier is kept only when `include_model`.
    pub fn success(result: SynthesisResult, include_model: bool) -> Self {
        Self::Success {
            audio: codec::encode_audio(&result.audio),
            format: result.format.to_string(),
            language: result.language.into(),
            model: if include_model { result.model } else { None },
        }
    }

    pub fn failure(error: &WorkerError) -> Self {
        Self::Failure {
            error: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Failure { error } => Some(error),
            Self::Success { .. } => None,
        }
    }
}
