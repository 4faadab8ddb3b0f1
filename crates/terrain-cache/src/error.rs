//! Error types for the terrain cache.

use thiserror::Error;

/// Errors that can occur when querying or configuring the terrain cache.
#[derive(Debug, Error)]
pub enum TerrainError {
    /// Latitude or longitude is NaN or infinite.
    #[error("Invalid coordinate ({lat}, {lon})")]
    InvalidCoordinate {
        /// Requested latitude.
        lat: f64,
        /// Requested longitude.
        lon: f64,
    },

    /// Coordinate is outside the bounds of a sample grid.
    #[error("Coordinate ({lat}, {lon}) is outside grid bounds ({min_lat}-{max_lat}, {min_lon}-{max_lon})")]
    OutOfBounds {
        /// Requested latitude.
        lat: f64,
        /// Requested longitude.
        lon: f64,
        /// Grid minimum latitude.
        min_lat: f64,
        /// Grid maximum latitude.
        max_lat: f64,
        /// Grid minimum longitude.
        min_lon: f64,
        /// Grid maximum longitude.
        max_lon: f64,
    },

    /// A configuration value was rejected.
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),
}
