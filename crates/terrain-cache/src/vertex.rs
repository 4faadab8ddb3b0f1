//! Per-vertex altitude caching.

use crate::cache::ResolutionState;
use crate::geo::GeoPoint;

/// A renderer vertex whose altitude is derived from the terrain cache.
///
/// The vertex remembers which position (`geo_version`) and which terrain
/// version its altitude was derived from, so a renderer can tell without a
/// lookup whether the altitude is still trustworthy.
#[derive(Debug, Clone)]
pub struct TerrainVertex {
    point: GeoPoint,
    geo_version: u64,
    altitude: Option<f64>,
    alt_geo_version: u64,
    alt_terrain_version: u64,
    state: Option<ResolutionState>,
}

impl TerrainVertex {
    /// Create a vertex with no altitude yet.
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            point: GeoPoint::new(lat, lon),
            geo_version: 1,
            altitude: None,
            alt_geo_version: 0,
            alt_terrain_version: 0,
            state: None,
        }
    }

    /// Geographic position.
    pub fn position(&self) -> GeoPoint {
        self.point
    }

    /// Move the vertex. Any cached altitude becomes stale.
    pub fn set_position(&mut self, lat: f64, lon: f64) {
        let point = GeoPoint::new(lat, lon);
        if point != self.point {
            self.point = point;
            self.geo_version += 1;
        }
    }

    /// Version of the geographic position, bumped on every move.
    pub fn geo_version(&self) -> u64 {
        self.geo_version
    }

    /// The position version the current altitude was derived from.
    pub fn alt_version(&self) -> u64 {
        self.alt_geo_version
    }

    /// Terrain version the current altitude was derived from.
    pub fn alt_terrain_version(&self) -> u64 {
        self.alt_terrain_version
    }

    /// Cached altitude in meters, if known.
    pub fn altitude(&self) -> Option<f64> {
        self.altitude
    }

    /// State of the last altitude lookup.
    pub fn state(&self) -> Option<ResolutionState> {
        self.state
    }

    /// True if the altitude must be re-derived.
    pub fn needs_update(&self, terrain_version: u64) -> bool {
        self.alt_geo_version != self.geo_version
            || self.alt_terrain_version != terrain_version
            || self.state != Some(ResolutionState::Resolved)
    }

    pub(crate) fn record(
        &mut self,
        altitude: Option<f64>,
        state: ResolutionState,
        terrain_version: u64,
    ) {
        self.altitude = altitude;
        self.state = Some(state);
        self.alt_geo_version = self.geo_version;
        self.alt_terrain_version = terrain_version;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_vertex_needs_update() {
        let vertex = TerrainVertex::new(1.0, 2.0);
        assert!(vertex.needs_update(1));
        assert_eq!(vertex.altitude(), None);
    }

    #[test]
    fn test_record_then_move() {
        let mut vertex = TerrainVertex::new(1.0, 2.0);
        vertex.record(Some(10.0), ResolutionState::Resolved, 3);
        assert!(!vertex.needs_update(3));
        assert!(vertex.needs_update(4));
        assert_eq!(vertex.alt_version(), vertex.geo_version());

        vertex.set_position(1.0, 2.0);
        assert!(!vertex.needs_update(3), "same position keeps the altitude");

        vertex.set_position(1.5, 2.0);
        assert!(vertex.needs_update(3));
        assert_ne!(vertex.alt_version(), vertex.geo_version());
    }

    #[test]
    fn test_resolving_altitude_is_retried() {
        let mut vertex = TerrainVertex::new(1.0, 2.0);
        vertex.record(None, ResolutionState::Resolving, 3);
        assert!(vertex.needs_update(3));
    }
}
