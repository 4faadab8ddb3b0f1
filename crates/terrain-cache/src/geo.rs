//! Geographic points, bounds and coordinate folding.

use crate::{Result, TerrainError};

/// A geographic coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    /// Latitude (positive = north).
    pub lat: f64,
    /// Longitude (positive = east).
    pub lon: f64,
}

impl GeoPoint {
    /// Create a new point.
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Reject NaN and infinite coordinates.
    pub fn validate(&self) -> Result<()> {
        if self.lat.is_finite() && self.lon.is_finite() {
            Ok(())
        } else {
            Err(TerrainError::InvalidCoordinate {
                lat: self.lat,
                lon: self.lon,
            })
        }
    }

    /// Fold the point into `lat ∈ [-90, 90]`, `lon ∈ (-180, 180]`.
    ///
    /// A latitude past a pole lands on the antipodal meridian: `(91, 0)` is
    /// the same place as `(89, 180)`. Longitudes are reduced modulo 360, with
    /// the antimeridian reported as 180.
    /// The input must be finite.
    pub fn folded(self) -> Self {
        let mut lat = self.lat;
        let mut lon = self.lon;

        // Latitude folding is periodic in 360 with no net longitude shift.
        if !(-270.0..=270.0).contains(&lat) {
            lat = (lat + 180.0).rem_euclid(360.0) - 180.0;
        }
        while lat < -90.0 {
            lat = -lat - 180.0;
            lon += 180.0;
        }
        while lat > 90.0 {
            lat = 180.0 - lat;
            lon += 180.0;
        }

        // The antimeridian is always 180, never -180.
        if lon <= -180.0 || lon > 180.0 {
            lon -= 360.0 * ((lon - 180.0) / 360.0).ceil();
            if lon <= -180.0 {
                lon += 360.0;
            }
        }

        Self { lat, lon }
    }
}

/// Geographic bounds of a quadtree cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBounds {
    /// Minimum latitude (south edge).
    pub min_lat: f64,
    /// Maximum latitude (north edge).
    pub max_lat: f64,
    /// Minimum longitude (west edge).
    pub min_lon: f64,
    /// Maximum longitude (east edge).
    pub max_lon: f64,
}

impl GeoBounds {
    /// Bounds of the index root.
    ///
    /// Latitude spans [-180, 180] so cells stay square in
    /// degrees; the part beyond the poles is sampled through [`GeoPoint::folded`].
    pub const ROOT: GeoBounds = GeoBounds {
        min_lat: -180.0,
        max_lat: 180.0,
        min_lon: -180.0,
        max_lon: 180.0,
    };

    /// Check if a coordinate is within the bounds (edges inclusive).
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }

    /// Midpoint latitude.
    pub fn mid_lat(&self) -> f64 {
        (self.min_lat + self.max_lat) / 2.0
    }

    /// Midpoint longitude.
    pub fn mid_lon(&self) -> f64 {
        (self.min_lon + self.max_lon) / 2.0
    }

    /// Quadrant of `(lat, lon)`: bit 0 set for east, bit 1 set for north.
    pub fn quadrant(&self, lat: f64, lon: f64) -> usize {
        let east = (lon >= self.mid_lon()) as usize;
        let north = (lat >= self.mid_lat()) as usize;
        (north << 1) | east
    }

    /// Bounds of the given quadrant.
    pub fn child(&self, quadrant: usize) -> GeoBounds {
        let mid_lat = self.mid_lat();
        let mid_lon = self.mid_lon();
        let (min_lon, max_lon) = if quadrant & 1 == 1 {
            (mid_lon, self.max_lon)
        } else {
            (self.min_lon, mid_lon)
        };
        let (min_lat, max_lat) = if quadrant & 2 == 2 {
            (mid_lat, self.max_lat)
        } else {
            (self.min_lat, mid_lat)
        };
        GeoBounds {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    /// Latitude span in degrees.
    pub fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Longitude span in degrees.
    pub fn lon_span(&self) -> f64 {
        self.max_lon - self.min_lon
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_in_domain_is_identity() {
        let p = GeoPoint::new(34.1, -79.6).folded();
        assert_eq!(p, GeoPoint::new(34.1, -79.6));

        let edge = GeoPoint::new(90.0, 180.0).folded();
        assert_eq!(edge, GeoPoint::new(90.0, 180.0));
    }

    #[test]
    fn test_fold_past_north_pole() {
        assert_eq!(GeoPoint::new(91.0, 0.0).folded(), GeoPoint::new(89.0, 180.0));
        assert_eq!(GeoPoint::new(100.0, 10.0).folded(), GeoPoint::new(80.0, -170.0));
    }

    #[test]
    fn test_fold_past_south_pole() {
        assert_eq!(GeoPoint::new(-91.0, 0.0).folded(), GeoPoint::new(-89.0, 180.0));
        assert_eq!(GeoPoint::new(-135.0, -90.0).folded(), GeoPoint::new(-45.0, 90.0));
    }

    #[test]
    fn test_fold_antimeridian() {
        assert_eq!(GeoPoint::new(10.0, 190.0).folded(), GeoPoint::new(10.0, -170.0));
        assert_eq!(GeoPoint::new(10.0, -540.0).folded(), GeoPoint::new(10.0, 180.0));
        assert_eq!(GeoPoint::new(10.0, 1090.0).folded(), GeoPoint::new(10.0, 10.0));
    }

    #[test]
    fn test_antimeridian_has_one_representation() {
        for lon in [-900.0, -540.0, -180.0, 180.0, 540.0, 900.0] {
            assert_eq!(GeoPoint::new(10.0, lon).folded(), GeoPoint::new(10.0, 180.0), "lon {}", lon);
        }
        // Past the pole onto the seam, from either side of the date line
        assert_eq!(GeoPoint::new(91.0, 0.0).folded(), GeoPoint::new(91.0, 360.0).folded());
        assert_eq!(GeoPoint::new(91.0, 360.0).folded(), GeoPoint::new(89.0, 180.0));
    }

    #[test]
    fn test_fold_large_latitude_terminates() {
        let p = GeoPoint::new(1.0e12, 0.0).folded();
        assert!((-90.0..=90.0).contains(&p.lat));
        assert!(p.lon > -180.0 && p.lon <= 180.0);
    }

    #[test]
    fn test_validate() {
        assert!(GeoPoint::new(0.0, 0.0).validate().is_ok());
        assert!(GeoPoint::new(f64::NAN, 0.0).validate().is_err());
        assert!(GeoPoint::new(0.0, f64::INFINITY).validate().is_err());
    }

    #[test]
    fn test_quadrants_cover_parent() {
        let root = GeoBounds::ROOT;
        assert_eq!(root.quadrant(-10.0, -10.0), 0);
        assert_eq!(root.quadrant(-10.0, 10.0), 1);
        assert_eq!(root.quadrant(10.0, -10.0), 2);
        assert_eq!(root.quadrant(10.0, 10.0), 3);

        let ne = root.child(3);
        assert_eq!(ne.min_lat, 0.0);
        assert_eq!(ne.max_lat, 180.0);
        assert_eq!(ne.min_lon, 0.0);
        assert_eq!(ne.max_lon, 180.0);
        assert!(ne.contains(10.0, 10.0));
        assert!(ne.contains(90.0, 180.0));
    }
}
