//! Background resolution of queued nodes.

use crate::cache::{SchedulerState, Shared};
use crate::node::{Node, NodeKey, NodeState, ResolveJob};
use std::cmp::Ordering;
use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::Arc;
use std::time::Instant;
use terrain_metrics::metric_defs;
use tracing::{debug, trace};

/// A queued resolution request.
///
/// Ordered so the heap yields coarse levels first, then the most recently
/// requested node within a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingNode {
    pub(crate) key: NodeKey,
    /// Cache milliseconds at enqueue time.
    pub(crate) request_time: i64,
}

impl Ord for PendingNode {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .key
            .level
            .cmp(&self.key.level)
            .then(self.request_time.cmp(&other.request_time))
            .then(other.key.cmp(&self.key))
    }
}

impl PartialOrd for PendingNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Resolver thread body: sleep while the queue is empty, otherwise resolve
/// one node at a time until shutdown.
pub(crate) fn run(shared: Arc<Shared>) {
    debug!("Terrain resolver '{}' started", shared.config.name);
    loop {
        {
            let mut state = shared.state.lock();
            while state.pending.is_empty() && !state.shutdown {
                shared.work_available.wait(&mut state);
            }
            if state.shutdown {
                break;
            }
        }
        shared.resolve_next();
    }
    debug!("Terrain resolver '{}' stopped", shared.config.name);
}

/// What to do with a node popped off the queue.
enum Dequeued {
    Resolve(ResolveJob, u64),
    Dropped,
}

impl Shared {
    /// True if nobody has wanted this node for a while and the terrain has
    /// moved on since they did.
    fn is_stale(&self, node: &Node, now: i64, version: u64) -> bool {
        now - node.last_request_time() > self.config.stale_request_ms as i64
            && version.saturating_sub(1) > node.last_request_version()
    }

    /// Pop the next node and decide whether it still needs resolving.
    fn dequeue(&self, state: &mut SchedulerState) -> Option<Dequeued> {
        let pending = state.pending.pop()?;
        self.record_pending(state);

        let now = self.now_ms();
        let version = self.terrain_version();
        let generation = state.generation;
        let SchedulerState {
            index, in_flight, ..
        } = state;

        let Some(node) = index.find_mut(pending.key) else {
            trace!("Queued node {:?} was pruned before resolution", pending.key);
            in_flight.remove(&pending.key);
            self.counters
                .nodes_discarded
                .fetch_add(1, AtomicOrdering::Relaxed);
            return Some(Dequeued::Dropped);
        };

        if matches!(node.state(), NodeState::Resolved | NodeState::Unresolvable) {
            in_flight.remove(&pending.key);
            return Some(Dequeued::Dropped);
        }

        if self.is_stale(node, now, version) {
            trace!(
                "Skipping stale node {:?} (requested {} ms ago at version {})",
                pending.key,
                now - node.last_request_time(),
                node.last_request_version()
            );
            node.abandon_resolution();
            in_flight.remove(&pending.key);
            self.counters
                .nodes_skipped_stale
                .fetch_add(1, AtomicOrdering::Relaxed);
            metrics::counter!(metric_defs::NODES_SKIPPED_STALE.name, &self.labels.to_labels())
                .increment(1);
            return Some(Dequeued::Dropped);
        }

        node.mark_resolving();
        Some(Dequeued::Resolve(
            node.resolution_job(self.config.grid_subdivisions),
            generation,
        ))
    }

    /// Resolve one queued node. Returns `false` if the queue was empty.
    pub(crate) fn resolve_next(&self) -> bool {
        let mut points = self.resolver.lock();

        let dequeued = {
            let mut state = self.state.lock();
            self.dequeue(&mut state)
        };
        let (job, generation) = match dequeued {
            None => return false,
            Some(Dequeued::Dropped) => return true,
            Some(Dequeued::Resolve(job, generation)) => (job, generation),
        };

        let started = Instant::now();
        let grid = job.resolve_elevations(self.provider.as_ref(), &mut points);
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        self.counters
            .provider_calls
            .fetch_add(1, AtomicOrdering::Relaxed);
        let labels = self.labels.to_labels();
        metrics::counter!(metric_defs::PROVIDER_SAMPLES.name, &labels).increment(points.len() as u64);
        metrics::histogram!(metric_defs::RESOLVE_TIME.name, &labels).record(elapsed_ms);

        let mut state = self.state.lock();
        if state.generation != generation {
            self.discard(&job.key, "cache invalidated");
            return true;
        }
        state.in_flight.remove(&job.key);

        let Some(node) = state.index.find_mut(job.key) else {
            self.discard(&job.key, "node pruned");
            return true;
        };

        let outcome = node.finish_resolution(grid);
        let version = self.bump_version();
        let counter = match outcome {
            NodeState::Unresolvable => &self.counters.nodes_unresolvable,
            _ => &self.counters.nodes_resolved,
        };
        counter.fetch_add(1, AtomicOrdering::Relaxed);
        drop(state);

        let outcome_label = match outcome {
            NodeState::Unresolvable => "unresolvable",
            _ => "resolved",
        };
        metrics::counter!(
            metric_defs::NODES_RESOLVED.name,
            &self.labels.with(&[("outcome", outcome_label.to_string())])
        )
        .increment(1);
        trace!(
            "Resolved node {:?} as {:?} in {:.1} ms (terrain version {})",
            job.key,
            outcome,
            elapsed_ms,
            version
        );
        true
    }

    fn discard(&self, key: &NodeKey, reason: &str) {
        debug!("Discarding resolution of node {:?}: {}", key, reason);
        self.counters
            .nodes_discarded
            .fetch_add(1, AtomicOrdering::Relaxed);
        metrics::counter!(
            metric_defs::NODES_RESOLVED.name,
            &self.labels.with(&[("outcome", "discarded".to_string())])
        )
        .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    fn pending(level: u32, col: u32, request_time: i64) -> PendingNode {
        PendingNode {
            key: NodeKey { level, col, row: 0 },
            request_time,
        }
    }

    #[test]
    fn test_coarse_levels_first() {
        let mut heap = BinaryHeap::new();
        heap.push(pending(5, 0, 100));
        heap.push(pending(2, 0, 10));
        heap.push(pending(3, 0, 500));

        assert_eq!(heap.pop().unwrap().key.level, 2);
        assert_eq!(heap.pop().unwrap().key.level, 3);
        assert_eq!(heap.pop().unwrap().key.level, 5);
    }

    #[test]
    fn test_most_recent_first_within_level() {
        let mut heap = BinaryHeap::new();
        heap.push(pending(4, 1, 100));
        heap.push(pending(4, 2, 300));
        heap.push(pending(4, 3, 200));

        assert_eq!(heap.pop().unwrap().key.col, 2);
        assert_eq!(heap.pop().unwrap().key.col, 3);
        assert_eq!(heap.pop().unwrap().key.col, 1);
    }
}
