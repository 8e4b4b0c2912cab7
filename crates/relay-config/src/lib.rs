//! Configuration for the relay engine
//!
//! Provider endpoints, fallback policy, capability overrides, cache lifetimes
//! and telemetry, loaded from TOML or assembled from the environment.

#![allow(clippy::must_use_candidate)]

mod duration;
mod env;
pub mod llm;
mod loader;
pub mod telemetry;

use serde::Deserialize;

pub use llm::*;
pub use telemetry::{ExportProtocol, ExporterConfig, LogFormat, TelemetryConfig};

/// Top-level relay configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// LLM provider and routing configuration
    #[serde(default)]
    pub llm: LlmConfig,
    /// Logging and trace export
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}
