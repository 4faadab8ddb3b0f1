//! # terrain-cache
//!
//! Level-of-detail elevation cache for globe renderers.
//!
//! The cache answers "what is the elevation at (lat, lon)?" every frame
//! without blocking. Elevations are kept in a quadtree over the globe whose
//! nodes each hold a small lattice of samples. A single background resolver
//! fills nodes in coarse-to-fine order by calling an [`ElevationProvider`];
//! until a node is ready the best coarser answer is returned.
//!
//! ## Overview
//!
//! - [`TerrainCache`] is the entry point: point and batch queries, vertex
//!   altitude updates, pruning, invalidation
//! - [`SpatialIndex`] and [`Node`] are the quadtree, with coordinates past
//!   the poles or the antimeridian folded back onto the globe
//! - [`SampleGrid`] is the per-node lattice with nearest or bilinear lookup
//! - [`TerrainVertex`] carries a position plus the altitude derived from it,
//!   re-derived only when the position or the terrain version changes
//!
//! ## Example
//!
//! ```no_run
//! use terrain_cache::{CacheConfig, GeoPoint, TerrainCache, TerrainVertex};
//!
//! let provider = |points: &[GeoPoint]| -> Vec<Option<f64>> {
//!     points.iter().map(|p| Some(100.0 + p.lat)).collect()
//! };
//! let cache = TerrainCache::new(CacheConfig::default(), provider)?;
//!
//! // Point query
//! let elevation = cache.get_elevation(34.1, -79.6, 10)?;
//! println!("{} at level {}: {:?}", elevation.state, elevation.level, elevation.value);
//!
//! // Vertex altitudes, refreshed once per frame
//! let mut strip = vec![TerrainVertex::new(34.1, -79.6), TerrainVertex::new(34.2, -79.5)];
//! cache.update_altitudes(&mut strip, 10);
//!
//! // When elevation is no longer being displayed
//! cache.try_to_free_unused_memory();
//! # Ok::<(), terrain_cache::TerrainError>(())
//! ```

mod cache;
mod config;
mod error;
mod geo;
mod grid;
mod index;
mod node;
mod provider;
mod vertex;
mod worker;

pub use cache::{CacheStats, Elevation, ResolutionState, TerrainCache};
pub use config::{CacheConfig, MAX_SUPPORTED_LEVEL};
pub use error::TerrainError;
pub use geo::{GeoBounds, GeoPoint};
pub use grid::{SampleGrid, DEFAULT_SUBDIVISIONS, UNKNOWN_ELEVATION};
pub use index::SpatialIndex;
pub use node::{Node, NodeKey, NodeState};
pub use provider::ElevationProvider;
pub use vertex::TerrainVertex;

/// Result type for terrain cache operations.
pub type Result<T> = std::result::Result<T, TerrainError>;
