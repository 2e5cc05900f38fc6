//! Error taxonomy for the synthesis worker.
//!
//! The `Display` output of [`WorkerError`] is exactly what ends up in the
//! `error` field of a failure envelope.

use std::path::PathBuf;

/// Message returned when a job carries no usable text.
pub const TEXT_REQUIRED: &str = "text is required";

/// Errors raised while serving or starting the worker.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Request rejected before any engine work.
    #[error("{0}")]
    Validation(String),

    /// Requested language is not served by the registry.
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// Engine invocation or artifact I/O failed.
    #[error("synthesis failed: {0}")]
    SynthesisFailure(String),

    /// An engine could not be loaded. Never surfaced per request.
    #[error("failed to load model {model} for {key}: {reason}")]
    StartupFailure {
        key: String,
        model: String,
        reason: String,
    },

    /// Worker configuration rejected at startup.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Anything else, including engine panics.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias for worker results.
pub type WorkerResult<T> = Result<T, WorkerError>;

impl WorkerError {
    pub fn text_required() -> Self {
        Self::Validation(TEXT_REQUIRED.to_string())
    }

    pub fn synthesis(msg: impl Into<String>) -> Self {
        Self::SynthesisFailure(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn startup(
        key: impl Into<String>,
        model: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::StartupFailure {
            key: key.into(),
            model: model.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error is an expected per-request outcome rather than a
    /// fault in the worker or its engines.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::UnsupportedLanguage(_))
    }
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}
