//! Quadtree cells and their resolution state.

use crate::geo::{GeoBounds, GeoPoint};
use crate::grid::SampleGrid;
use crate::provider::ElevationProvider;
use crate::Result;

/// Address of a quadtree cell: its level and column/row at that level.
///
/// Column 0 is the westmost cell, row 0 the southmost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    /// Quadtree depth (0 = root).
    pub level: u32,
    /// Column at this level.
    pub col: u32,
    /// Row at this level.
    pub row: u32,
}

impl NodeKey {
    /// Key of the index root.
    pub const ROOT: NodeKey = NodeKey {
        level: 0,
        col: 0,
        row: 0,
    };

    /// Key of the child in the given quadrant.
    pub fn child(&self, quadrant: usize) -> NodeKey {
        NodeKey {
            level: self.level + 1,
            col: (self.col << 1) | ((quadrant as u32) & 1),
            row: (self.row << 1) | (((quadrant as u32) >> 1) & 1),
        }
    }

    /// Quadrant taken when descending from depth `depth` toward this key.
    pub fn quadrant_at(&self, depth: u32) -> usize {
        debug_assert!(depth < self.level);
        let shift = self.level - 1 - depth;
        let east = (self.col >> shift) & 1;
        let north = (self.row >> shift) & 1;
        ((north << 1) | east) as usize
    }
}

/// Resolution state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Never queued.
    Unresolved,
    /// Queued or being resolved.
    Resolving,
    /// Holds a sample grid.
    Resolved,
    /// The provider had no data for any sample. Never retried.
    Unresolvable,
}

/// A quadtree cell.
#[derive(Debug)]
pub struct Node {
    key: NodeKey,
    bounds: GeoBounds,
    children: [Option<Box<Node>>; 4],
    state: NodeState,
    grid: Option<SampleGrid>,
    last_request_time: i64,
    last_request_version: u64,
}

impl Node {
    /// Create an unresolved node.
    pub fn new(key: NodeKey, bounds: GeoBounds) -> Self {
        Self {
            key,
            bounds,
            children: [None, None, None, None],
            state: NodeState::Unresolved,
            grid: None,
            last_request_time: 0,
            last_request_version: 0,
        }
    }

    /// Create an index root.
    pub fn root() -> Self {
        Self::new(NodeKey::ROOT, GeoBounds::ROOT)
    }

    /// The node's address.
    pub fn key(&self) -> NodeKey {
        self.key
    }

    /// Quadtree depth.
    pub fn level(&self) -> u32 {
        self.key.level
    }

    /// Geographic bounds.
    pub fn bounds(&self) -> GeoBounds {
        self.bounds
    }

    /// Current resolution state.
    pub fn state(&self) -> NodeState {
        self.state
    }

    /// The sample grid, present iff the node is resolved.
    pub fn grid(&self) -> Option<&SampleGrid> {
        self.grid.as_ref()
    }

    /// True once the node holds elevation data.
    pub fn is_data_node(&self) -> bool {
        self.state == NodeState::Resolved
    }

    /// Time of the most recent request, in cache milliseconds.
    pub fn last_request_time(&self) -> i64 {
        self.last_request_time
    }

    /// Terrain version at the most recent request.
    pub fn last_request_version(&self) -> u64 {
        self.last_request_version
    }

    /// Record a request. Recently stamped nodes are protected from pruning.
    pub fn stamp(&mut self, time: i64, version: u64) {
        self.last_request_time = self.last_request_time.max(time);
        self.last_request_version = self.last_request_version.max(version);
    }

    /// True if any child exists.
    pub fn has_children(&self) -> bool {
        self.children.iter().any(Option::is_some)
    }

    /// The child in the given quadrant, if it has been created.
    pub fn child(&self, quadrant: usize) -> Option<&Node> {
        self.children[quadrant].as_deref()
    }

    pub(crate) fn child_mut(&mut self, quadrant: usize) -> Option<&mut Node> {
        self.children[quadrant].as_deref_mut()
    }

    /// The child containing `(lat, lon)`, created on first use.
    pub fn child_containing(&mut self, lat: f64, lon: f64) -> &mut Node {
        let quadrant = self.bounds.quadrant(lat, lon);
        let key = self.key.child(quadrant);
        let bounds = self.bounds.child(quadrant);
        self.children[quadrant].get_or_insert_with(|| Box::new(Node::new(key, bounds)))
    }

    /// Elevation at a point inside the node.
    ///
    /// `Ok(None)` when the node holds no grid or the lookup touches an
    /// unknown sample.
    pub fn elevation(&self, lat: f64, lon: f64, interpolate: bool) -> Result<Option<f64>> {
        match &self.grid {
            Some(grid) => grid.elevation(lat, lon, interpolate),
            None => Ok(None),
        }
    }

    /// Move an unresolved node onto the queue.
    pub(crate) fn mark_resolving(&mut self) {
        if self.state == NodeState::Unresolved {
            self.state = NodeState::Resolving;
        }
    }

    /// Return a queued node to `Unresolved` without resolving it.
    pub(crate) fn abandon_resolution(&mut self) {
        if self.state == NodeState::Resolving {
            self.state = NodeState::Unresolved;
        }
    }

    /// Snapshot of what the resolver needs, taken under the tree lock.
    pub(crate) fn resolution_job(&self, subdivisions: usize) -> ResolveJob {
        ResolveJob {
            key: self.key,
            bounds: self.bounds,
            subdivisions,
        }
    }

    /// Install the result of a resolution.
    ///
    /// A grid with no known sample leaves the node `Unresolvable` and
    /// without a grid.
    pub(crate) fn finish_resolution(&mut self, grid: SampleGrid) -> NodeState {
        if grid.is_empty() {
            self.grid = None;
            self.state = NodeState::Unresolvable;
        } else {
            self.grid = Some(grid);
            self.state = NodeState::Resolved;
        }
        self.state
    }

    /// Detach stale leaves below this node.
    ///
    /// Children are pruned depth first; a child left without children whose
    /// last request is older than `cutoff` is removed. The node itself is
    /// never removed. Returns the number of nodes removed.
    pub fn prune(&mut self, cutoff: i64) -> usize {
        let mut removed = 0;
        for slot in self.children.iter_mut() {
            let Some(child) = slot else {
                continue;
            };
            removed += child.prune(cutoff);
            if !child.has_children() && child.last_request_time < cutoff {
                *slot = None;
                removed += 1;
            }
        }
        removed
    }

    /// Number of nodes in this subtree, including this one.
    pub fn count(&self) -> usize {
        1 + self
            .children
            .iter()
            .flatten()
            .map(|child| child.count())
            .sum::<usize>()
    }
}

/// A node's resolution, detached from the tree so it can run unlocked.
#[derive(Debug, Clone)]
pub(crate) struct ResolveJob {
    pub(crate) key: NodeKey,
    pub(crate) bounds: GeoBounds,
    pub(crate) subdivisions: usize,
}

impl ResolveJob {
    /// Ask the provider for every lattice sample in one batch.
    ///
    /// `points` is scratch space reused across jobs.
    pub(crate) fn resolve_elevations(
        &self,
        provider: &dyn ElevationProvider,
        points: &mut Vec<GeoPoint>,
    ) -> SampleGrid {
        points.clear();
        SampleGrid::lattice_points(&self.bounds, self.subdivisions, points);

        let samples = provider.resolve_batch(points);
        if samples.len() != points.len() {
            tracing::warn!(
                "Provider returned {} samples for {} points (node {:?})",
                samples.len(),
                points.len(),
                self.key
            );
        }

        SampleGrid::from_samples(self.bounds, self.subdivisions, &samples)
    }
}
