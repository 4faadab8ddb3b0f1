//! Cache configuration.

use crate::grid::DEFAULT_SUBDIVISIONS;
use crate::{Result, TerrainError};

/// Deepest level a [`NodeKey`](crate::NodeKey) can address.
pub const MAX_SUPPORTED_LEVEL: u32 = 30;

/// Tunables for a [`TerrainCache`](crate::TerrainCache).
///
/// Every field has a default; with the `serde` feature enabled the struct can
/// be deserialized from a partial document.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct CacheConfig {
    /// Name used to label this cache's metrics and logs.
    pub name: String,
    /// Deepest node level the cache will resolve.
    pub max_level: u32,
    /// Subdivisions per grid axis; each node holds `(n + 1)^2` samples.
    pub grid_subdivisions: usize,
    /// Levels subtracted from the view level for point queries.
    pub point_level_offset: u32,
    /// Levels subtracted from the view level for vertex updates.
    pub vertex_level_offset: u32,
    /// Nodes not requested for this long are pruned by
    /// [`try_to_free_unused_memory`](crate::TerrainCache::try_to_free_unused_memory).
    pub prune_age_ms: u64,
    /// Queued requests older than this (and superseded by a later terrain
    /// version) are dropped by the resolver.
    pub stale_request_ms: u64,
    /// Bilinear interpolation when true, nearest sample otherwise.
    pub interpolate: bool,
    /// Start a background resolver thread on first use. When false, the
    /// embedder drives resolution with
    /// [`resolve_next`](crate::TerrainCache::resolve_next).
    pub spawn_worker: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: "terrain".to_string(),
            max_level: 16,
            grid_subdivisions: DEFAULT_SUBDIVISIONS,
            point_level_offset: 3,
            vertex_level_offset: 1,
            prune_age_ms: 30_000,
            stale_request_ms: 1_000,
            interpolate: true,
            spawn_worker: true,
        }
    }
}

impl CacheConfig {
    /// Check the configuration for values the cache cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_level > MAX_SUPPORTED_LEVEL {
            return Err(TerrainError::InvalidConfig(format!(
                "max_level {} exceeds {}",
                self.max_level, MAX_SUPPORTED_LEVEL
            )));
        }
        if self.grid_subdivisions == 0 {
            return Err(TerrainError::InvalidConfig(
                "grid_subdivisions must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Admissible level for a query made at `view_level`.
    pub(crate) fn admissible_level(&self, view_level: u32, offset: u32) -> u32 {
        view_level.saturating_sub(offset).min(self.max_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CacheConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.grid_subdivisions, 15);
        assert_eq!(config.prune_age_ms, 30_000);
    }

    #[test]
    fn test_rejects_bad_values() {
        let config = CacheConfig {
            grid_subdivisions: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(TerrainError::InvalidConfig(_))));

        let config = CacheConfig {
            max_level: 31,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_admissible_level_clamps() {
        let config = CacheConfig {
            max_level: 10,
            ..Default::default()
        };
        assert_eq!(config.admissible_level(2, 3), 0);
        assert_eq!(config.admissible_level(8, 3), 5);
        assert_eq!(config.admissible_level(20, 1), 10);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_partial_yaml() {
        let config: CacheConfig = serde_yaml::from_str("max_level: 12\nspawn_worker: false\n").unwrap();
        assert_eq!(config.max_level, 12);
        assert!(!config.spawn_worker);
        assert_eq!(config.point_level_offset, 3);
    }
}
