//! voxroute-core — Pure types for the voxroute synthesis worker.
//!
//! Language keys, request/response envelopes, the error taxonomy, the
//! admission policy and worker configuration. No async runtime, no I/O
//! beyond reading a config file.

pub mod admission;
pub mod codec;
pub mod config;
pub mod error;
pub mod language;
pub mod types;
pub mod wav;

pub use error::{ConfigError, WorkerError};
pub use language::LanguageKey;
