//! Analytic terrain standing in for a real elevation source.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;
use terrain_cache::{ElevationProvider, GeoPoint};

/// Rolling hills built from a few sinusoids, with everything at or below
/// sea level reported as unknown ("ocean").
#[derive(Debug)]
pub struct SyntheticTerrain {
    latency: Duration,
    sea_level_m: f64,
    batches: AtomicU64,
    points: AtomicU64,
}

impl SyntheticTerrain {
    /// Create a provider that sleeps `latency` per batch.
    pub fn new(latency: Duration, sea_level_m: f64) -> Self {
        Self {
            latency,
            sea_level_m,
            batches: AtomicU64::new(0),
            points: AtomicU64::new(0),
        }
    }

    /// Height of the analytic surface in meters, before the sea cut.
    pub fn height(lat: f64, lon: f64) -> f64 {
        let phi = lat.to_radians();
        let lambda = lon.to_radians();
        1200.0 * (3.0 * phi).sin() * (2.0 * lambda).cos()
            + 400.0 * (11.0 * phi + 7.0 * lambda).sin()
            + 150.0 * (37.0 * phi).cos() * (41.0 * lambda).sin()
            + 300.0
    }

    /// Elevation at a point, `None` over ocean.
    pub fn elevation(&self, lat: f64, lon: f64) -> Option<f64> {
        let height = Self::height(lat, lon);
        (height > self.sea_level_m).then_some(height)
    }

    /// Batches served so far.
    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    /// Points served so far.
    pub fn points(&self) -> u64 {
        self.points.load(Ordering::Relaxed)
    }
}

impl ElevationProvider for SyntheticTerrain {
    fn resolve_batch(&self, points: &[GeoPoint]) -> Vec<Option<f64>> {
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.points.fetch_add(points.len() as u64, Ordering::Relaxed);
        points.iter().map(|p| self.elevation(p.lat, p.lon)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_batch_matches_points() {
        let terrain = SyntheticTerrain::new(Duration::ZERO, f64::NEG_INFINITY);
        let points = [GeoPoint::new(10.0, 20.0), GeoPoint::new(-45.0, 170.0)];

        let batch = terrain.resolve_batch(&points);
        assert_eq!(batch.len(), 2);
        assert_relative_eq!(batch[0].unwrap(), SyntheticTerrain::height(10.0, 20.0));
        assert_eq!(terrain.batches(), 1);
        assert_eq!(terrain.points(), 2);
    }

    #[test]
    fn test_ocean_is_unknown() {
        let terrain = SyntheticTerrain::new(Duration::ZERO, 0.0);
        let mut land = 0;
        let mut ocean = 0;
        for i in 0..90 {
            for j in 0..180 {
                let (lat, lon) = (i as f64 * 2.0 - 89.0, j as f64 * 2.0 - 179.0);
                match terrain.elevation(lat, lon) {
                    Some(h) => {
                        assert!(h > 0.0);
                        land += 1;
                    }
                    None => ocean += 1,
                }
            }
        }
        assert!(land > 0);
        assert!(ocean > 0);
    }
}
