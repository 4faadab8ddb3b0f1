//! Quadtree spatial index over the sample-grid nodes.

use crate::geo::GeoPoint;
use crate::node::{Node, NodeKey};
use crate::Result;

/// Owns the quadtree root and resolves points to nodes.
#[derive(Debug)]
pub struct SpatialIndex {
    root: Node,
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl SpatialIndex {
    /// Create an index holding only an unresolved root.
    pub fn new() -> Self {
        Self { root: Node::root() }
    }

    /// The root node.
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Locate the node answering `(lat, lon)` at up to `max_level`.
    ///
    /// Descent continues only through resolved nodes: it stops at
    /// `max_level` or at the first node without data, creating children
    /// along the way as needed. Coordinates past a pole or the antimeridian
    /// are folded first.
    pub fn locate(&mut self, lat: f64, lon: f64, max_level: u32) -> Result<&mut Node> {
        let point = GeoPoint::new(lat, lon);
        point.validate()?;
        Ok(self.descend(point.folded(), max_level, |_| {}))
    }

    /// Descend toward an already folded point, calling `visit` on every node
    /// along the path, the returned node included.
    pub(crate) fn descend<F>(&mut self, point: GeoPoint, max_level: u32, mut visit: F) -> &mut Node
    where
        F: FnMut(&mut Node),
    {
        let mut node = &mut self.root;
        visit(&mut *node);
        while node.level() < max_level && node.is_data_node() {
            node = node.child_containing(point.lat, point.lon);
            visit(&mut *node);
        }
        node
    }

    /// Look up an existing node by key.
    pub fn find(&self, key: NodeKey) -> Option<&Node> {
        let mut node = &self.root;
        for depth in 0..key.level {
            node = node.child(key.quadrant_at(depth))?;
        }
        Some(node)
    }

    /// Look up an existing node by key, mutably.
    pub fn find_mut(&mut self, key: NodeKey) -> Option<&mut Node> {
        let mut node = &mut self.root;
        for depth in 0..key.level {
            node = node.child_mut(key.quadrant_at(depth))?;
        }
        Some(node)
    }

    /// Remove stale leaves. The root is thinned, never removed.
    pub fn prune(&mut self, cutoff: i64) -> usize {
        self.root.prune(cutoff)
    }

    /// Number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        self.root.count()
    }
}
