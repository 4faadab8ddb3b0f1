//! # terrain-runner
//!
//! Drives a [`TerrainCache`](terrain_cache::TerrainCache) along a scripted
//! camera path against a synthetic elevation provider. Used by the
//! `terrain-probe` binary for soak testing and demonstration.

mod config;
mod error;
mod probe;
mod synthetic;

pub use config::{RunnerConfig, ScenarioConfig};
pub use error::RunnerError;
pub use probe::{run_probe, ProbeReport};
pub use synthetic::SyntheticTerrain;

/// Result type for runner operations.
pub type Result<T> = std::result::Result<T, RunnerError>;
