//! Fixed-size elevation sample grid covering one node.

use crate::geo::{GeoBounds, GeoPoint};
use crate::{Result, TerrainError};

/// Sentinel stored for samples the provider could not resolve.
///
/// Distinct from NaN, which the cache uses for "not computed yet".
pub const UNKNOWN_ELEVATION: f64 = f64::NEG_INFINITY;

/// Default number of subdivisions per grid axis (`N + 1` samples per axis).
pub const DEFAULT_SUBDIVISIONS: usize = 15;

/// An immutable `(N + 1) x (N + 1)` lattice of elevation samples.
///
/// Rows run south to north, columns west to east, stored row-major.
#[derive(Debug, Clone)]
pub struct SampleGrid {
    bounds: GeoBounds,
    lat_samples: Vec<f64>,
    lon_samples: Vec<f64>,
    elevations: Vec<f64>,
}

impl SampleGrid {
    /// Sample lattice for the given bounds, south to north then west to east.
    ///
    /// Returns `(lat_samples, lon_samples)`, each of length `subdivisions + 1`.
    pub fn lattice(bounds: &GeoBounds, subdivisions: usize) -> (Vec<f64>, Vec<f64>) {
        let axis = |min: f64, max: f64| -> Vec<f64> {
            (0..=subdivisions)
                .map(|i| {
                    if i == subdivisions {
                        max
                    } else {
                        min + (max - min) * i as f64 / subdivisions as f64
                    }
                })
                .collect()
        };
        (
            axis(bounds.min_lat, bounds.max_lat),
            axis(bounds.min_lon, bounds.max_lon),
        )
    }

    /// Append the lattice points to `points`, in storage order.
    ///
    /// Points are folded into the physical domain, so cells that extend past
    /// a pole ask the provider for the equivalent point on the other side.
    pub fn lattice_points(bounds: &GeoBounds, subdivisions: usize, points: &mut Vec<GeoPoint>) {
        let (lats, lons) = Self::lattice(bounds, subdivisions);
        points.reserve(lats.len() * lons.len());
        for &lat in &lats {
            for &lon in &lons {
                points.push(GeoPoint::new(lat, lon).folded());
            }
        }
    }

    /// Build a grid from provider output in lattice order.
    ///
    /// Missing and non-finite values become [`UNKNOWN_ELEVATION`]. A result
    /// shorter than the lattice is padded with unknowns; extra values are
    /// ignored.
    pub fn from_samples(bounds: GeoBounds, subdivisions: usize, samples: &[Option<f64>]) -> Self {
        let (lat_samples, lon_samples) = Self::lattice(&bounds, subdivisions);
        let count = lat_samples.len() * lon_samples.len();
        let elevations = (0..count)
            .map(|i| match samples.get(i) {
                Some(Some(v)) if v.is_finite() => *v,
                _ => UNKNOWN_ELEVATION,
            })
            .collect();

        Self {
            bounds,
            lat_samples,
            lon_samples,
            elevations,
        }
    }

    /// Geographic bounds covered by the grid.
    pub fn bounds(&self) -> GeoBounds {
        self.bounds
    }

    /// Number of subdivisions per axis.
    pub fn subdivisions(&self) -> usize {
        self.lon_samples.len() - 1
    }

    /// Latitudes of the lattice rows, south to north.
    pub fn lat_samples(&self) -> &[f64] {
        &self.lat_samples
    }

    /// Longitudes of the lattice columns, west to east.
    pub fn lon_samples(&self) -> &[f64] {
        &self.lon_samples
    }

    /// True if every sample is unknown.
    pub fn is_empty(&self) -> bool {
        self.elevations.iter().all(|v| *v == UNKNOWN_ELEVATION)
    }

    /// Raw sample at `(row, col)`, `None` if unknown.
    pub fn sample(&self, row: usize, col: usize) -> Option<f64> {
        let value = self.elevations[row * self.lon_samples.len() + col];
        (value != UNKNOWN_ELEVATION).then_some(value)
    }

    /// Elevation at a coordinate inside the grid.
    ///
    /// With `interpolate` the four surrounding samples are blended
    /// bilinearly; otherwise the nearest sample is returned. `Ok(None)` means
    /// a participating sample is unknown. Coordinates outside the bounds are
    /// a caller error and are never clamped.
    pub fn elevation(&self, lat: f64, lon: f64, interpolate: bool) -> Result<Option<f64>> {
        if !self.bounds.contains(lat, lon) {
            return Err(TerrainError::OutOfBounds {
                lat,
                lon,
                min_lat: self.bounds.min_lat,
                max_lat: self.bounds.max_lat,
                min_lon: self.bounds.min_lon,
                max_lon: self.bounds.max_lon,
            });
        }

        let n = self.subdivisions();
        let x = (lon - self.bounds.min_lon) / self.bounds.lon_span() * n as f64;
        let y = (lat - self.bounds.min_lat) / self.bounds.lat_span() * n as f64;

        if !interpolate {
            let col = (x.round() as usize).min(n);
            let row = (y.round() as usize).min(n);
            return Ok(self.sample(row, col));
        }

        let x0 = (x.floor() as usize).min(n);
        let y0 = (y.floor() as usize).min(n);
        let x1 = (x0 + 1).min(n);
        let y1 = (y0 + 1).min(n);
        let x_frac = x - x0 as f64;
        let y_frac = y - y0 as f64;

        let (Some(bl), Some(br), Some(tl), Some(tr)) = (
            self.sample(y0, x0),
            self.sample(y0, x1),
            self.sample(y1, x0),
            self.sample(y1, x1),
        ) else {
            return Ok(None);
        };

        let bottom = lerp(bl, br, x_frac);
        let top = lerp(tl, tr, x_frac);
        Ok(Some(lerp(bottom, top, y_frac)))
    }

    /// Largest absolute difference between neighbouring samples, in meters.
    ///
    /// Bounds how far an interpolated value can move across one grid cell.
    pub fn max_step(&self) -> f64 {
        let n = self.subdivisions();
        let mut max = 0.0f64;
        for row in 0..=n {
            for col in 0..=n {
                let Some(v) = self.sample(row, col) else {
                    continue;
                };
                if col < n {
                    if let Some(right) = self.sample(row, col + 1) {
                        max = max.max((right - v).abs());
                    }
                }
                if row < n {
                    if let Some(up) = self.sample(row + 1, col) {
                        max = max.max((up - v).abs());
                    }
                }
            }
        }
        max
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_bounds() -> GeoBounds {
        GeoBounds {
            min_lat: 0.0,
            max_lat: 1.0,
            min_lon: 0.0,
            max_lon: 1.0,
        }
    }

    /// 2x2 cells; elevation = 100 * row + col.
    fn small_grid() -> SampleGrid {
        let samples: Vec<Option<f64>> = (0..9)
            .map(|i| Some(100.0 * (i / 3) as f64 + (i % 3) as f64))
            .collect();
        SampleGrid::from_samples(unit_bounds(), 2, &samples)
    }

    #[test]
    fn test_lattice_endpoints_exact() {
        let bounds = GeoBounds {
            min_lat: 34.0,
            max_lat: 34.7,
            min_lon: -80.0,
            max_lon: -79.3,
        };
        let (lats, lons) = SampleGrid::lattice(&bounds, 15);
        assert_eq!(lats.len(), 16);
        assert_eq!(lons.len(), 16);
        assert_eq!(lats[0], 34.0);
        assert_eq!(lats[15], 34.7);
        assert_eq!(lons[0], -80.0);
        assert_eq!(lons[15], -79.3);
    }

    #[test]
    fn test_nearest_and_bilinear() {
        let grid = small_grid();

        assert_eq!(grid.elevation(0.0, 0.0, false).unwrap(), Some(0.0));
        assert_eq!(grid.elevation(1.0, 1.0, false).unwrap(), Some(202.0));
        // Rounds to row 1, col 1
        assert_eq!(grid.elevation(0.6, 0.4, false).unwrap(), Some(101.0));

        let v = grid.elevation(0.25, 0.25, true).unwrap().unwrap();
        assert_relative_eq!(v, 50.5, epsilon = 1e-9);

        let v = grid.elevation(0.75, 0.5, true).unwrap().unwrap();
        assert_relative_eq!(v, 151.0, epsilon = 1e-9);
    }

    #[test]
    fn test_bilinear_at_far_edge() {
        let grid = small_grid();
        // On the top-right corner the right/top neighbours degenerate.
        let v = grid.elevation(1.0, 1.0, true).unwrap().unwrap();
        assert_relative_eq!(v, 202.0);
        let v = grid.elevation(1.0, 0.75, true).unwrap().unwrap();
        assert_relative_eq!(v, 201.5, epsilon = 1e-9);
    }

    #[test]
    fn test_out_of_bounds_is_an_error() {
        let grid = small_grid();
        let err = grid.elevation(1.5, 0.5, true).unwrap_err();
        assert!(matches!(err, TerrainError::OutOfBounds { .. }));
        assert!(grid.elevation(0.5, -0.0001, false).is_err());
    }

    #[test]
    fn test_unknown_corner_propagates() {
        let mut samples: Vec<Option<f64>> = (0..9).map(|i| Some(i as f64)).collect();
        // Top-right corner
        samples[8] = None;
        let grid = SampleGrid::from_samples(unit_bounds(), 2, &samples);

        assert_eq!(grid.elevation(0.9, 0.9, true).unwrap(), None);
        assert_eq!(grid.elevation(0.6, 0.6, true).unwrap(), None);
        assert_eq!(grid.elevation(1.0, 1.0, false).unwrap(), None);
        // Footprint excluding the corner is unaffected
        assert!(grid.elevation(0.25, 0.25, true).unwrap().is_some());
        assert!(!grid.is_empty());
    }

    #[test]
    fn test_non_finite_and_short_batches_become_unknown() {
        let samples = vec![Some(1.0), Some(f64::NAN), Some(f64::INFINITY)];
        let grid = SampleGrid::from_samples(unit_bounds(), 2, &samples);
        assert_eq!(grid.sample(0, 0), Some(1.0));
        assert_eq!(grid.sample(0, 1), None);
        assert_eq!(grid.sample(0, 2), None);
        assert_eq!(grid.sample(2, 2), None);

        let empty = SampleGrid::from_samples(unit_bounds(), 2, &[]);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_lattice_points_fold_past_pole() {
        let bounds = GeoBounds {
            min_lat: 90.0,
            max_lat: 180.0,
            min_lon: 0.0,
            max_lon: 90.0,
        };
        let mut points = Vec::new();
        SampleGrid::lattice_points(&bounds, 2, &mut points);
        assert_eq!(points.len(), 9);
        for p in &points {
            assert!((-90.0..=90.0).contains(&p.lat), "{:?} not folded", p);
        }
        // (135, 0) folds to (45, 180)
        assert_eq!(points[3], GeoPoint::new(45.0, 180.0));
    }

    #[test]
    fn test_max_step() {
        let grid = small_grid();
        assert_relative_eq!(grid.max_step(), 100.0);
    }
}
