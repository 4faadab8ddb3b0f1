//! The frame loop: move the camera, query, update vertices, report.

use crate::config::ScenarioConfig;
use crate::Result;
use std::thread;
use std::time::{Duration, Instant};
use terrain_cache::{CacheStats, GeoPoint, ResolutionState, TerrainCache, TerrainVertex};
use tracing::{debug, info, warn};

/// Totals for one probe run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeReport {
    /// Frames executed.
    pub frames: u32,
    /// Point queries answered with a value.
    pub resolved: u64,
    /// Point queries still waiting for data.
    pub resolving: u64,
    /// Point queries over areas with no data.
    pub unresolvable: u64,
    /// Point queries rejected as invalid.
    pub rejected: u64,
    /// Vertices whose altitude was re-derived.
    pub vertex_updates: u64,
    /// Deepest level any query was answered from.
    pub deepest_level: u32,
    /// Nodes freed by the final prune.
    pub pruned: usize,
    /// Terrain version after the final prune.
    pub terrain_version: u64,
    /// Cache counters at the end of the run.
    pub stats: CacheStats,
}

impl ProbeReport {
    /// Total point queries issued.
    pub fn queries(&self) -> u64 {
        self.resolved + self.resolving + self.unresolvable + self.rejected
    }
}

/// Camera position at `frame`.
fn camera(scenario: &ScenarioConfig, frame: u32) -> GeoPoint {
    GeoPoint::new(
        scenario.start_lat + scenario.step_lat * frame as f64,
        scenario.start_lon + scenario.step_lon * frame as f64,
    )
}

/// Evenly spaced values across `span` centred on `center`.
fn spread(center: f64, span: f64, count: usize) -> impl Iterator<Item = f64> {
    let step = if count > 1 { span / (count - 1) as f64 } else { 0.0 };
    let first = center - step * (count.saturating_sub(1)) as f64 / 2.0;
    (0..count).map(move |i| first + step * i as f64)
}

/// Query points around the camera, sample_grid × sample_grid.
fn sample_points(scenario: &ScenarioConfig, center: GeoPoint) -> Vec<GeoPoint> {
    let n = scenario.sample_grid;
    let mut points = Vec::with_capacity(n * n);
    for lat in spread(center.lat, scenario.sample_span_deg, n) {
        for lon in spread(center.lon, scenario.sample_span_deg, n) {
            points.push(GeoPoint::new(lat, lon));
        }
    }
    points
}

/// Run the scenario against `cache` and tilt to zero at the end.
///
/// With the cache's background worker disabled, one pending node is
/// resolved per frame on this thread. Fails before the first frame if the
/// scenario does not validate.
pub fn run_probe(cache: &TerrainCache, scenario: &ScenarioConfig) -> Result<ProbeReport> {
    scenario.validate()?;

    let mut report = ProbeReport::default();
    let cooperative = !cache.config().spawn_worker;
    let frame_time = Duration::from_millis(scenario.frame_ms);

    let start = camera(scenario, 0);
    let mut strip: Vec<TerrainVertex> = spread(start.lon, scenario.strip_span_deg, scenario.strip_vertices)
        .map(|lon| TerrainVertex::new(start.lat, lon))
        .collect();

    info!(
        "Probing from ({:.4}, {:.4}) for {} frames at view level {}",
        start.lat, start.lon, scenario.frames, scenario.view_level
    );
    let started = Instant::now();

    for frame in 0..scenario.frames {
        let frame_start = Instant::now();
        let center = camera(scenario, frame);

        let points = sample_points(scenario, center);
        for result in cache.get_elevations(&points, scenario.view_level) {
            match result {
                Ok(elevation) => {
                    match elevation.state {
                        ResolutionState::Resolved => report.resolved += 1,
                        ResolutionState::Resolving => report.resolving += 1,
                        ResolutionState::Unresolvable => report.unresolvable += 1,
                    }
                    if elevation.value.is_some() {
                        report.deepest_level = report.deepest_level.max(elevation.level);
                    }
                }
                Err(e) => {
                    warn!("Frame {}: query rejected: {}", frame, e);
                    report.rejected += 1;
                }
            }
        }

        // The strip rides along with the camera
        for (vertex, lon) in strip
            .iter_mut()
            .zip(spread(center.lon, scenario.strip_span_deg, scenario.strip_vertices))
        {
            vertex.set_position(center.lat, lon);
        }
        report.vertex_updates += cache.update_altitudes(&mut strip, scenario.view_level) as u64;

        if cooperative {
            cache.resolve_next();
        }

        report.frames += 1;
        if (frame + 1) % scenario.report_every == 0 {
            info!(
                "Frame {}: {} pending, {} nodes, terrain version {}, deepest level {}",
                frame + 1,
                cache.pending_count(),
                cache.node_count(),
                cache.terrain_version(),
                report.deepest_level
            );
        }

        if let Some(rest) = frame_time.checked_sub(frame_start.elapsed()) {
            thread::sleep(rest);
        }
    }

    debug!(
        "Frame loop finished in {:.2}s, tilting to zero",
        started.elapsed().as_secs_f64()
    );
    report.pruned = cache.try_to_free_unused_memory();
    report.terrain_version = cache.terrain_version();
    report.stats = cache.stats();

    info!(
        "Probe done: {} queries ({} resolved, {} resolving, {} unresolvable, {} rejected), {} vertex updates",
        report.queries(),
        report.resolved,
        report.resolving,
        report.unresolvable,
        report.rejected,
        report.vertex_updates
    );
    info!(
        "Cache: {} nodes resolved, {} unresolvable, {} skipped stale, {} pruned, {} provider calls",
        report.stats.nodes_resolved,
        report.stats.nodes_unresolvable,
        report.stats.nodes_skipped_stale,
        report.stats.nodes_pruned,
        report.stats.provider_calls
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticTerrain;
    use crate::RunnerError;
    use approx::assert_relative_eq;
    use std::sync::Arc;
    use terrain_cache::CacheConfig;

    fn quick_scenario() -> ScenarioConfig {
        ScenarioConfig {
            frames: 40,
            frame_ms: 0,
            view_level: 8,
            sample_grid: 3,
            strip_vertices: 8,
            report_every: 10,
            latency_ms: 0,
            sea_level_m: f64::NEG_INFINITY,
            ..Default::default()
        }
    }

    #[test]
    fn test_spread_is_centred() {
        let values: Vec<f64> = spread(10.0, 2.0, 5).collect();
        assert_eq!(values.len(), 5);
        assert_relative_eq!(values[0], 9.0);
        assert_relative_eq!(values[2], 10.0);
        assert_relative_eq!(values[4], 11.0);

        let single: Vec<f64> = spread(3.0, 2.0, 1).collect();
        assert_eq!(single, vec![3.0]);
    }

    #[test]
    fn test_cooperative_probe_refines() {
        let scenario = quick_scenario();
        let terrain = Arc::new(SyntheticTerrain::new(Duration::ZERO, scenario.sea_level_m));
        let config = CacheConfig {
            spawn_worker: false,
            ..Default::default()
        };
        let cache = TerrainCache::new(config, Arc::clone(&terrain)).unwrap();

        let report = run_probe(&cache, &scenario).unwrap();

        assert_eq!(report.frames, 40);
        assert_eq!(report.queries(), 40 * 9);
        assert_eq!(report.rejected, 0);
        assert!(report.resolved > 0);
        assert!(report.deepest_level >= 3);
        assert_eq!(report.stats.provider_calls, terrain.batches());
        assert!(report.terrain_version > 1);
    }

    fn manual_cache() -> TerrainCache {
        let config = CacheConfig {
            spawn_worker: false,
            ..Default::default()
        };
        TerrainCache::new(config, SyntheticTerrain::new(Duration::ZERO, 0.0)).unwrap()
    }

    #[test]
    fn test_zero_report_interval_rejected() {
        let scenario = ScenarioConfig {
            report_every: 0,
            ..quick_scenario()
        };
        let cache = manual_cache();

        let err = run_probe(&cache, &scenario).unwrap_err();
        assert!(matches!(err, RunnerError::InvalidScenario(_)));
        assert_eq!(cache.pending_count(), 0);
        assert_eq!(cache.node_count(), 1);
    }

    #[test]
    fn test_non_finite_start_rejected() {
        let scenario = ScenarioConfig {
            start_lat: f64::NAN,
            frames: 2,
            ..quick_scenario()
        };
        let cache = manual_cache();

        assert!(run_probe(&cache, &scenario).is_err());
        assert_eq!(cache.pending_count(), 0);
    }
}
