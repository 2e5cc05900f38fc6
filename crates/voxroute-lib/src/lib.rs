//! voxroute-lib — Synthesis worker runtime.
//!
//! Engine backends, the language-keyed model registry, request dispatch,
//! scratch artifacts, startup and the HTTP host.
//! Depends on voxroute-core for pure types and configuration.

pub mod dispatcher;
pub mod engine;
pub mod registry;
pub mod scratch;
pub mod server;
pub mod service;
pub mod worker;

#[cfg(test)]
mod test_support;

// Re-export voxroute-core for convenience
pub use voxroute_core;
