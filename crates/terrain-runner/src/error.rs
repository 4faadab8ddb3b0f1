//! Error types for the probe runner.

use std::path::PathBuf;
use terrain_cache::TerrainError;
use thiserror::Error;

/// Errors that can occur while loading or running a probe scenario.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Scenario file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Scenario file is not valid YAML for a [`RunnerConfig`](crate::RunnerConfig).
    #[error("Failed to parse scenario: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Scenario values out of range.
    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),

    /// The cache rejected its configuration or a query.
    #[error("Terrain cache error: {0}")]
    Cache(#[from] TerrainError),
}
