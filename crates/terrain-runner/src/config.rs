//! Scenario file loading.
//!
//! A scenario file has two optional sections:
//!
//! ```yaml
//! cache:
//!   max_level: 14
//!   grid_subdivisions: 15
//! scenario:
//!   start_lat: 34.1
//!   start_lon: -79.6
//!   frames: 600
//!   view_level: 12
//! ```

use crate::{Result, RunnerError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use terrain_cache::CacheConfig;

/// Top-level probe configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    /// Cache settings, passed through unchanged.
    pub cache: CacheConfig,
    /// Camera path and synthetic terrain settings.
    pub scenario: ScenarioConfig,
}

/// Scripted camera path and synthetic terrain.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Camera latitude at frame 0.
    pub start_lat: f64,
    /// Camera longitude at frame 0.
    pub start_lon: f64,
    /// Camera latitude change per frame, degrees.
    pub step_lat: f64,
    /// Camera longitude change per frame, degrees.
    pub step_lon: f64,
    /// Frames to run before tilting to zero.
    pub frames: u32,
    /// Wall-clock pause between frames, milliseconds.
    pub frame_ms: u64,
    /// View level reported to the cache.
    pub view_level: u32,
    /// Points queried per frame along each axis.
    pub sample_grid: usize,
    /// Width of the sampled square around the camera, degrees.
    pub sample_span_deg: f64,
    /// Vertices in the strip updated each frame.
    pub strip_vertices: usize,
    /// Length of the vertex strip, degrees of longitude.
    pub strip_span_deg: f64,
    /// Frames between progress reports.
    pub report_every: u32,
    /// Artificial provider latency per batch, milliseconds.
    pub latency_ms: u64,
    /// Synthetic terrain at or below this height is reported as unknown.
    pub sea_level_m: f64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            start_lat: 34.1,
            start_lon: -79.6,
            step_lat: 0.002,
            step_lon: 0.005,
            frames: 300,
            frame_ms: 16,
            view_level: 12,
            sample_grid: 4,
            sample_span_deg: 0.5,
            strip_vertices: 32,
            strip_span_deg: 1.0,
            report_every: 60,
            latency_ms: 5,
            sea_level_m: 0.0,
        }
    }
}

impl ScenarioConfig {
    /// Check for values the probe cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !self.start_lat.is_finite() || !self.start_lon.is_finite() {
            return Err(RunnerError::InvalidScenario(format!(
                "start point ({}, {}) is not finite",
                self.start_lat, self.start_lon
            )));
        }
        if self.report_every == 0 {
            return Err(RunnerError::InvalidScenario(
                "report_every must be at least 1".to_string(),
            ));
        }
        if self.sample_span_deg < 0.0 || self.strip_span_deg < 0.0 {
            return Err(RunnerError::InvalidScenario(
                "spans must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

impl RunnerConfig {
    /// Parse a configuration from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: RunnerConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| RunnerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Validate both sections.
    pub fn validate(&self) -> Result<()> {
        self.cache.validate()?;
        self.scenario.validate()
    }
}
