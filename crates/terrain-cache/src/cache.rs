//! The terrain cache: foreground queries over a background-resolved quadtree.
//!
//! ## Thread Safety
//!
//! `TerrainCache` is shared by reference between the renderer and one
//! resolver thread:
//! - Foreground queries only read resolved data and enqueue work; they never
//!   wait for a resolution
//! - The tree, pending queue, in-flight set and terrain version live behind
//!   one lock, held only briefly by either side
//! - The elevation provider is called with the lock released, one node at a
//!   time

use crate::config::CacheConfig;
use crate::geo::GeoPoint;
use crate::index::SpatialIndex;
use crate::node::{NodeKey, NodeState};
use crate::provider::ElevationProvider;
use crate::vertex::TerrainVertex;
use crate::worker::{self, PendingNode};
use crate::Result;
use parking_lot::{Condvar, Mutex};
use std::collections::{BinaryHeap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use terrain_metrics::{metric_defs, CacheLabels};
use tracing::{debug, error, info, warn};

/// Availability of an elevation value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    /// A value is available.
    Resolved,
    /// Not available yet; ask again next frame.
    Resolving,
    /// The provider has no data here.
    Unresolvable,
}

impl ResolutionState {
    /// Lowercase name, used as a metric label.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ResolutionState::Resolved => "resolved",
            ResolutionState::Resolving => "resolving",
            ResolutionState::Unresolvable => "unresolvable",
        }
    }
}

impl std::fmt::Display for ResolutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a foreground elevation query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Elevation {
    /// Elevation in meters, when available.
    pub value: Option<f64>,
    /// Whether `value` can be used.
    pub state: ResolutionState,
    /// Level of the node that produced `value`, or of the node the query
    /// is waiting on.
    pub level: u32,
}

/// Snapshot of cache activity counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Nodes resolved with data.
    pub nodes_resolved: u64,
    /// Nodes for which the provider had no data.
    pub nodes_unresolvable: u64,
    /// Queued nodes dropped by the staleness guard.
    pub nodes_skipped_stale: u64,
    /// Resolutions thrown away because the node was pruned or the cache
    /// invalidated meanwhile.
    pub nodes_discarded: u64,
    /// Nodes removed by pruning.
    pub nodes_pruned: u64,
    /// Batches handed to the provider.
    pub provider_calls: u64,
}

#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    pub(crate) nodes_resolved: AtomicU64,
    pub(crate) nodes_unresolvable: AtomicU64,
    pub(crate) nodes_skipped_stale: AtomicU64,
    pub(crate) nodes_discarded: AtomicU64,
    pub(crate) nodes_pruned: AtomicU64,
    pub(crate) provider_calls: AtomicU64,
}

/// State guarded by the scheduler lock.
#[derive(Debug)]
pub(crate) struct SchedulerState {
    pub(crate) index: SpatialIndex,
    pub(crate) pending: BinaryHeap<PendingNode>,
    pub(crate) in_flight: HashSet<NodeKey>,
    /// Bumped by `invalidate`; resolutions started under an older
    /// generation are discarded.
    pub(crate) generation: u64,
    pub(crate) shutdown: bool,
}

/// Everything shared between the cache handle and the resolver thread.
pub(crate) struct Shared {
    pub(crate) config: CacheConfig,
    pub(crate) labels: CacheLabels,
    pub(crate) provider: Box<dyn ElevationProvider>,
    epoch: Instant,
    pub(crate) state: Mutex<SchedulerState>,
    pub(crate) work_available: Condvar,
    /// Scratch point batch; holding it serializes provider calls.
    pub(crate) resolver: Mutex<Vec<GeoPoint>>,
    /// Only written with `state` locked.
    terrain_version: AtomicU64,
    pub(crate) counters: CacheCounters,
}

impl Shared {
    /// Milliseconds since the cache was created.
    pub(crate) fn now_ms(&self) -> i64 {
        self.epoch.elapsed().as_millis() as i64
    }

    pub(crate) fn terrain_version(&self) -> u64 {
        self.terrain_version.load(Ordering::Acquire)
    }

    /// Increment the terrain version. Call with `state` locked.
    pub(crate) fn bump_version(&self) -> u64 {
        let version = self.terrain_version.fetch_add(1, Ordering::AcqRel) + 1;
        metrics::gauge!(metric_defs::TERRAIN_VERSION.name, &self.labels.to_labels())
            .set(version as f64);
        version
    }

    pub(crate) fn record_pending(&self, state: &SchedulerState) {
        metrics::gauge!(metric_defs::PENDING_NODES.name, &self.labels.to_labels())
            .set(state.pending.len() as f64);
    }

    /// Answer a query from resolved data, stamping the path and enqueueing
    /// the node the query stopped at if it still needs data.
    fn lookup(&self, state: &mut SchedulerState, point: GeoPoint, level: u32) -> Elevation {
        let now = self.now_ms();
        let version = self.terrain_version();
        let interpolate = self.config.interpolate;
        let shutdown = state.shutdown;

        let mut best: Option<(f64, u32)> = None;
        let target = state.index.descend(point, level, |node| {
            node.stamp(now, version);
            if node.is_data_node() {
                match node.elevation(point.lat, point.lon, interpolate) {
                    Ok(Some(value)) => best = Some((value, node.level())),
                    Ok(None) => {}
                    Err(err) => warn!("Lookup escaped node {:?}: {}", node.key(), err),
                }
            }
        });
        if !shutdown {
            target.mark_resolving();
        }
        let key = target.key();
        let node_state = target.state();

        if node_state == NodeState::Resolving {
            self.enqueue(state, key, now);
        }

        match best {
            Some((value, level)) => Elevation {
                value: Some(value),
                state: ResolutionState::Resolved,
                level,
            },
            None => Elevation {
                value: None,
                state: match node_state {
                    NodeState::Unresolved | NodeState::Resolving => ResolutionState::Resolving,
                    NodeState::Resolved | NodeState::Unresolvable => ResolutionState::Unresolvable,
                },
                level: key.level,
            },
        }
    }

    /// Queue a node unless it is already queued or being resolved.
    fn enqueue(&self, state: &mut SchedulerState, key: NodeKey, now: i64) {
        if state.shutdown || !state.in_flight.insert(key) {
            return;
        }
        state.pending.push(PendingNode {
            key,
            request_time: now,
        });
        metrics::counter!(metric_defs::NODES_ENQUEUED.name, &self.labels.to_labels()).increment(1);
        self.record_pending(state);
        self.work_available.notify_one();
    }
}

/// Level-of-detail elevation cache.
///
/// Answers "elevation at (lat, lon)" from already-resolved quadtree nodes and
/// hands unresolved nodes to a background resolver that calls the
/// [`ElevationProvider`] one node at a time.
///
/// # Example
///
/// ```no_run
/// use terrain_cache::{CacheConfig, GeoPoint, ResolutionState, TerrainCache};
///
/// let provider = |points: &[GeoPoint]| -> Vec<Option<f64>> {
///     points.iter().map(|p| Some(p.lat * 10.0)).collect()
/// };
/// let cache = TerrainCache::new(CacheConfig::default(), provider)?;
///
/// // Called every frame; returns immediately.
/// let elevation = cache.get_elevation(34.1, -79.6, 8)?;
/// if elevation.state == ResolutionState::Resolved {
///     println!("Elevation: {:?} meters", elevation.value);
/// }
/// # Ok::<(), terrain_cache::TerrainError>(())
/// ```
pub struct TerrainCache {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_started: AtomicBool,
}

impl std::fmt::Debug for TerrainCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerrainCache")
            .field("config", &self.shared.config)
            .field("terrain_version", &self.shared.terrain_version())
            .finish()
    }
}

impl TerrainCache {
    /// Create a cache over `provider`.
    ///
    /// The resolver thread (if enabled) starts on the first query.
    pub fn new<P>(config: CacheConfig, provider: P) -> Result<Self>
    where
        P: ElevationProvider + 'static,
    {
        config.validate()?;
        let labels = CacheLabels::new(config.name.clone());

        let shared = Shared {
            config,
            labels,
            provider: Box::new(provider),
            epoch: Instant::now(),
            state: Mutex::new(SchedulerState {
                index: SpatialIndex::new(),
                pending: BinaryHeap::new(),
                in_flight: HashSet::new(),
                generation: 0,
                shutdown: false,
            }),
            work_available: Condvar::new(),
            resolver: Mutex::new(Vec::new()),
            terrain_version: AtomicU64::new(1),
            counters: CacheCounters::default(),
        };

        Ok(Self {
            shared: Arc::new(shared),
            worker: Mutex::new(None),
            worker_started: AtomicBool::new(false),
        })
    }

    /// The configuration this cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.shared.config
    }

    /// Current terrain version.
    ///
    /// Changes whenever a node finishes resolving, a prune removes nodes, or
    /// the cache is invalidated. Dependent caches compare against it to know
    /// when to re-derive altitudes.
    pub fn terrain_version(&self) -> u64 {
        self.shared.terrain_version()
    }

    /// Start the resolver thread on first use.
    fn ensure_worker(&self) {
        if !self.shared.config.spawn_worker || self.worker_started.load(Ordering::Acquire) {
            return;
        }

        let mut worker = self.worker.lock();
        if self.worker_started.load(Ordering::Acquire) {
            return;
        }
        self.worker_started.store(true, Ordering::Release);

        if self.shared.state.lock().shutdown {
            return;
        }

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(format!("{}-resolver", self.shared.config.name))
            .spawn(move || worker::run(shared));
        match spawned {
            Ok(handle) => *worker = Some(handle),
            Err(e) => error!("Failed to start terrain resolver thread: {}", e),
        }
    }

    /// Elevation at a point for a view at `view_level`.
    ///
    /// Never blocks on resolution. When the node the view calls for is not
    /// resolved yet it is queued, and the value of the deepest resolved
    /// ancestor (if any) is returned in the meantime.
    ///
    /// # Arguments
    /// * `lat` - Latitude in decimal degrees (positive = north)
    /// * `lon` - Longitude in decimal degrees (positive = east)
    /// * `view_level` - Level of detail implied by the current view
    pub fn get_elevation(&self, lat: f64, lon: f64, view_level: u32) -> Result<Elevation> {
        let point = GeoPoint::new(lat, lon);
        point.validate()?;
        self.ensure_worker();

        let config = &self.shared.config;
        let level = config.admissible_level(view_level, config.point_level_offset);

        let elevation = {
            let mut state = self.shared.state.lock();
            self.shared.lookup(&mut state, point.folded(), level)
        };

        metrics::counter!(
            metric_defs::QUERIES.name,
            &self.shared.labels.with(&[("state", elevation.state.as_str().to_string())])
        )
        .increment(1);

        Ok(elevation)
    }

    /// Elevations for a batch of points, answered under one lock acquisition.
    pub fn get_elevations(&self, points: &[GeoPoint], view_level: u32) -> Vec<Result<Elevation>> {
        self.ensure_worker();

        let config = &self.shared.config;
        let level = config.admissible_level(view_level, config.point_level_offset);

        let mut state = self.shared.state.lock();
        points
            .iter()
            .map(|point| -> Result<Elevation> {
                point.validate()?;
                Ok(self.shared.lookup(&mut state, point.folded(), level))
            })
            .collect()
    }

    /// Refresh a vertex's altitude if it is out of date.
    ///
    /// Returns the state of the vertex's altitude after the call.
    pub fn update_altitude(&self, vertex: &mut TerrainVertex, view_level: u32) -> Result<ResolutionState> {
        vertex.position().validate()?;
        self.update_altitudes(std::slice::from_mut(vertex), view_level);
        Ok(vertex.state().unwrap_or(ResolutionState::Resolving))
    }

    /// Refresh every out-of-date vertex in `vertices`.
    ///
    /// Vertices whose altitude was derived from their current position and
    /// the current terrain version are left alone. Vertices with invalid
    /// coordinates are marked unresolvable. Returns the number of vertices
    /// looked up.
    pub fn update_altitudes(&self, vertices: &mut [TerrainVertex], view_level: u32) -> usize {
        self.ensure_worker();

        let config = &self.shared.config;
        let level = config.admissible_level(view_level, config.vertex_level_offset);

        let mut updated = 0;
        let mut skipped = 0u64;
        {
            let mut state = self.shared.state.lock();
            for vertex in vertices.iter_mut() {
                let version = self.shared.terrain_version();
                if !vertex.needs_update(version) {
                    skipped += 1;
                    continue;
                }

                let point = vertex.position();
                if point.validate().is_err() {
                    vertex.record(None, ResolutionState::Unresolvable, version);
                    continue;
                }

                let elevation = self.shared.lookup(&mut state, point.folded(), level);
                vertex.record(elevation.value, elevation.state, version);
                updated += 1;
            }
        }

        if skipped > 0 {
            metrics::counter!(
                metric_defs::VERTEX_UPDATES_SKIPPED.name,
                &self.shared.labels.to_labels()
            )
            .increment(skipped);
        }
        updated
    }

    /// Drop nodes nobody has asked for recently.
    ///
    /// Intended for when the view stops needing elevation. Leaves not
    /// requested within `prune_age_ms` are removed and the terrain version
    /// is bumped. Returns the number of nodes removed.
    pub fn try_to_free_unused_memory(&self) -> usize {
        let mut state = self.shared.state.lock();
        let cutoff = self.shared.now_ms() - self.shared.config.prune_age_ms as i64;
        let removed = state.index.prune(cutoff);
        let version = self.shared.bump_version();
        drop(state);

        self.shared
            .counters
            .nodes_pruned
            .fetch_add(removed as u64, Ordering::Relaxed);
        metrics::counter!(metric_defs::NODES_PRUNED.name, &self.shared.labels.to_labels())
            .increment(removed as u64);
        debug!(
            "Pruned {} terrain nodes (terrain version now {})",
            removed, version
        );
        removed
    }

    /// Discard all terrain after the provider's data changed.
    ///
    /// The tree is reset to an empty root, queued work is dropped, and any
    /// resolution in progress is discarded when it completes.
    pub fn invalidate(&self) {
        let mut state = self.shared.state.lock();
        state.index = SpatialIndex::new();
        state.pending.clear();
        state.in_flight.clear();
        state.generation += 1;
        let version = self.shared.bump_version();
        self.shared.record_pending(&state);
        info!(
            "Terrain cache '{}' invalidated (terrain version now {})",
            self.shared.config.name, version
        );
    }

    /// Resolve one pending node on the calling thread.
    ///
    /// Returns `false` if the queue was empty. Waits for any resolution the
    /// background thread has in progress.
    pub fn resolve_next(&self) -> bool {
        self.shared.resolve_next()
    }

    /// Resolve pending nodes until the queue is empty.
    ///
    /// Returns the number of queue entries consumed.
    pub fn resolve_pending(&self) -> usize {
        let mut count = 0;
        while self.shared.resolve_next() {
            count += 1;
        }
        count
    }

    /// Number of nodes waiting for resolution.
    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Number of nodes queued or being resolved.
    pub fn in_flight_count(&self) -> usize {
        self.shared.state.lock().in_flight.len()
    }

    /// Number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        self.shared.state.lock().index.node_count()
    }

    /// Run `f` against the tree with the scheduler lock held.
    pub fn with_index<R>(&self, f: impl FnOnce(&SpatialIndex) -> R) -> R {
        f(&self.shared.state.lock().index)
    }

    /// Activity counters since the cache was created.
    pub fn stats(&self) -> CacheStats {
        let c = &self.shared.counters;
        CacheStats {
            nodes_resolved: c.nodes_resolved.load(Ordering::Relaxed),
            nodes_unresolvable: c.nodes_unresolvable.load(Ordering::Relaxed),
            nodes_skipped_stale: c.nodes_skipped_stale.load(Ordering::Relaxed),
            nodes_discarded: c.nodes_discarded.load(Ordering::Relaxed),
            nodes_pruned: c.nodes_pruned.load(Ordering::Relaxed),
            provider_calls: c.provider_calls.load(Ordering::Relaxed),
        }
    }

    /// Stop the resolver thread and wait for it to finish.
    ///
    /// A resolution in progress completes first. Afterwards queries still
    /// answer from resolved data but nothing new is queued.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            if !state.shutdown {
                state.shutdown = true;
                state.pending.clear();
                state.in_flight.clear();
            }
        }
        self.shared.work_available.notify_all();

        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                error!("Terrain resolver thread panicked");
            }
        }
    }
}

impl Drop for TerrainCache {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn manual_config() -> CacheConfig {
        CacheConfig {
            spawn_worker: false,
            ..Default::default()
        }
    }

    fn flat(points: &[GeoPoint]) -> Vec<Option<f64>> {
        vec![Some(42.0); points.len()]
    }

    #[test]
    fn test_invalid_coordinate_not_enqueued() {
        let cache = TerrainCache::new(manual_config(), flat).unwrap();
        assert!(cache.get_elevation(f64::NAN, 0.0, 10).is_err());
        assert_eq!(cache.pending_count(), 0);
    }

    #[test]
    fn test_coarse_value_while_refining() {
        let cache = TerrainCache::new(manual_config(), flat).unwrap();

        let first = cache.get_elevation(10.0, 10.0, 8).unwrap();
        assert_eq!(first.state, ResolutionState::Resolving);
        assert_eq!(first.value, None);
        assert!(cache.resolve_next());

        // Root resolved; the level-1 node is queued but the root answers
        let second = cache.get_elevation(10.0, 10.0, 8).unwrap();
        assert_eq!(second.state, ResolutionState::Resolved);
        assert_eq!(second.level, 0);
        assert_eq!(second.value, Some(42.0));
        assert_eq!(cache.pending_count(), 1);

        cache.resolve_pending();
        let third = cache.get_elevation(10.0, 10.0, 8).unwrap();
        assert_eq!(third.level, 1);
    }

    #[test]
    fn test_unresolvable_is_terminal() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let provider = move |points: &[GeoPoint]| -> Vec<Option<f64>> {
            counter.fetch_add(1, Ordering::SeqCst);
            vec![None; points.len()]
        };
        let cache = TerrainCache::new(manual_config(), provider).unwrap();

        cache.get_elevation(0.0, 0.0, 5).unwrap();
        assert_eq!(cache.resolve_pending(), 1);

        let elevation = cache.get_elevation(0.0, 0.0, 5).unwrap();
        assert_eq!(elevation.state, ResolutionState::Unresolvable);
        assert_eq!(elevation.value, None);
        assert_eq!(cache.resolve_pending(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().nodes_unresolvable, 1);
    }

    #[test]
    fn test_invalidate_resets_tree() {
        let cache = TerrainCache::new(manual_config(), flat).unwrap();
        cache.get_elevation(10.0, 10.0, 8).unwrap();
        cache.resolve_pending();
        cache.get_elevation(10.0, 10.0, 8).unwrap();
        assert!(cache.node_count() > 1);

        let before = cache.terrain_version();
        cache.invalidate();
        assert_eq!(cache.terrain_version(), before + 1);
        assert_eq!(cache.node_count(), 1);
        assert_eq!(cache.pending_count(), 0);
        assert_eq!(cache.in_flight_count(), 0);

        let after = cache.get_elevation(10.0, 10.0, 8).unwrap();
        assert_eq!(after.state, ResolutionState::Resolving);
    }

    #[test]
    fn test_shutdown_stops_enqueueing() {
        let cache = TerrainCache::new(manual_config(), flat).unwrap();
        cache.shutdown();
        let elevation = cache.get_elevation(1.0, 1.0, 6).unwrap();
        assert_eq!(elevation.state, ResolutionState::Resolving);
        assert_eq!(cache.pending_count(), 0);
        assert!(!cache.resolve_next());
    }

    #[test]
    fn test_nearest_sampling_config() {
        let config = CacheConfig {
            interpolate: false,
            grid_subdivisions: 2,
            ..manual_config()
        };
        let provider = |points: &[GeoPoint]| -> Vec<Option<f64>> {
            points.iter().map(|p| Some(p.lon)).collect()
        };
        let cache = TerrainCache::new(config, provider).unwrap();
        cache.get_elevation(10.0, 100.0, 3).unwrap();
        cache.resolve_next();
        // Root lattice columns are at -180, 0, 180; 100 rounds to 180
        let elevation = cache.get_elevation(10.0, 100.0, 3).unwrap();
        assert_eq!(elevation.value, Some(180.0));
    }
}
