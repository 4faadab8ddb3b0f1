//! Metrics infrastructure for the terrain elevation cache.
//!
//! This crate declares every metric the cache records as a structured
//! [`Metric`] constant, plus a small label helper. It re-exports the `metrics`
//! crate so that callers record through the same facade version.
//!
//! # Example
//!
//! ```rust,ignore
//! use terrain_metrics::{describe_metrics, metric_defs, CacheLabels};
//!
//! // Initialize metric descriptions at startup
//! describe_metrics();
//!
//! let labels = CacheLabels::new("terrain");
//! metrics::counter!(metric_defs::NODES_ENQUEUED.name, &labels.to_labels()).increment(1);
//! ```
//!
//! # Metric Type
//!
//! ```rust
//! use terrain_metrics::{Metric, MetricKind};
//! use metrics::Unit;
//!
//! const MY_COUNTER: Metric = Metric::counter("my.counter")
//!     .with_description("A counter metric")
//!     .with_unit(Unit::Count)
//!     .with_labels(&["cache"]);
//!
//! assert_eq!(MY_COUNTER.kind, MetricKind::Counter);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// How a metric is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

/// A metric name plus the metadata handed to the recorder at startup.
///
/// ```rust
/// use terrain_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const NODES: Metric = Metric::gauge("terrain.cache.nodes")
///     .with_description("Nodes currently in the tree")
///     .with_unit(Unit::Count)
///     .with_labels(&["cache"]);
///
/// assert_eq!(NODES.kind, MetricKind::Gauge);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// Key passed to the `metrics` macros.
    pub name: &'static str,
    pub kind: MetricKind,
    pub description: &'static str,
    pub unit: Option<Unit>,
    /// Label keys recorded alongside the value.
    pub labels: &'static [&'static str],
}

impl Metric {
    const fn new(name: &'static str, kind: MetricKind) -> Self {
        Self {
            name,
            kind,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    pub const fn counter(name: &'static str) -> Self {
        Self::new(name, MetricKind::Counter)
    }

    pub const fn gauge(name: &'static str) -> Self {
        Self::new(name, MetricKind::Gauge)
    }

    pub const fn histogram(name: &'static str) -> Self {
        Self::new(name, MetricKind::Histogram)
    }

    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Hand the description and unit to whatever recorder is installed.
    pub fn describe(&self) {
        let (name, text) = (self.name, self.description);
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => describe_counter!(name, unit, text),
            (MetricKind::Counter, None) => describe_counter!(name, text),
            (MetricKind::Gauge, Some(unit)) => describe_gauge!(name, unit, text),
            (MetricKind::Gauge, None) => describe_gauge!(name, text),
            (MetricKind::Histogram, Some(unit)) => describe_histogram!(name, unit, text),
            (MetricKind::Histogram, None) => describe_histogram!(name, text),
        }
    }
}

/// All metric definitions for the terrain cache.
pub mod metric_defs {
    use super::{Metric, Unit};

    // ========================================================================
    // Foreground Queries
    // ========================================================================

    /// Foreground elevation queries answered.
    ///
    /// Labels: cache, state (resolved, resolving, unresolvable)
    pub const QUERIES: Metric = Metric::counter("terrain.cache.queries")
        .with_description("Foreground elevation queries answered")
        .with_unit(Unit::Count)
        .with_labels(&["cache", "state"]);

    /// Vertex altitude updates skipped because the cached altitude was current.
    pub const VERTEX_UPDATES_SKIPPED: Metric = Metric::counter("terrain.cache.vertex_updates_skipped")
        .with_description("Vertex altitude updates skipped because the altitude was current")
        .with_unit(Unit::Count)
        .with_labels(&["cache"]);

    // ========================================================================
    // Resolution Queue
    // ========================================================================

    /// Nodes placed on the pending resolution queue.
    pub const NODES_ENQUEUED: Metric = Metric::counter("terrain.cache.nodes_enqueued")
        .with_description("Nodes placed on the pending resolution queue")
        .with_unit(Unit::Count)
        .with_labels(&["cache"]);

    /// Current depth of the pending resolution queue.
    pub const PENDING_NODES: Metric = Metric::gauge("terrain.cache.pending")
        .with_description("Nodes waiting for background resolution")
        .with_unit(Unit::Count)
        .with_labels(&["cache"]);

    /// Nodes completed by the resolver.
    ///
    /// Labels: cache, outcome (resolved, unresolvable, discarded)
    pub const NODES_RESOLVED: Metric = Metric::counter("terrain.cache.nodes_resolved")
        .with_description("Nodes completed by the resolver")
        .with_unit(Unit::Count)
        .with_labels(&["cache", "outcome"]);

    /// Nodes dropped from the queue because nobody requested them recently.
    pub const NODES_SKIPPED_STALE: Metric = Metric::counter("terrain.cache.nodes_skipped_stale")
        .with_description("Queued nodes skipped because their request went stale")
        .with_unit(Unit::Count)
        .with_labels(&["cache"]);

    /// Time spent inside the elevation provider for one node.
    pub const RESOLVE_TIME: Metric = Metric::histogram("terrain.cache.resolve_time_ms")
        .with_description("Time spent resolving one node's sample grid")
        .with_unit(Unit::Milliseconds)
        .with_labels(&["cache"]);

    /// Sample points handed to the elevation provider.
    pub const PROVIDER_SAMPLES: Metric = Metric::counter("terrain.cache.provider_samples")
        .with_description("Sample points handed to the elevation provider")
        .with_unit(Unit::Count)
        .with_labels(&["cache"]);

    // ========================================================================
    // Tree Maintenance
    // ========================================================================

    /// Nodes removed by pruning.
    pub const NODES_PRUNED: Metric = Metric::counter("terrain.cache.nodes_pruned")
        .with_description("Nodes removed by pruning")
        .with_unit(Unit::Count)
        .with_labels(&["cache"]);

    /// Current terrain version.
    pub const TERRAIN_VERSION: Metric = Metric::gauge("terrain.cache.version")
        .with_description("Current terrain version")
        .with_labels(&["cache"]);

    /// Returns a slice of all defined metrics.
    pub const ALL: &[&Metric] = &[
        &QUERIES,
        &VERTEX_UPDATES_SKIPPED,
        &NODES_ENQUEUED,
        &PENDING_NODES,
        &NODES_RESOLVED,
        &NODES_SKIPPED_STALE,
        &RESOLVE_TIME,
        &PROVIDER_SAMPLES,
        &NODES_PRUNED,
        &TERRAIN_VERSION,
    ];
}

/// Labels identifying which cache instance a metric belongs to.
///
/// ```rust
/// use terrain_metrics::CacheLabels;
///
/// let labels = CacheLabels::new("terrain");
/// let extended = labels.with(&[("state", "resolved".to_string())]);
/// assert_eq!(extended.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct CacheLabels {
    /// Cache instance name.
    pub cache: String,
}

impl CacheLabels {
    /// Creates labels for the named cache.
    pub fn new(cache: impl Into<String>) -> Self {
        Self {
            cache: cache.into(),
        }
    }

    /// Converts the labels to the metrics crate label format.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![("cache", self.cache.clone())]
    }

    /// Returns labels with additional key-value pairs.
    pub fn with(&self, extra: &[(&'static str, String)]) -> Vec<(&'static str, String)> {
        let mut labels = self.to_labels();
        labels.extend_from_slice(extra);
        labels
    }
}

/// Describes all metrics used by the cache.
///
/// Call once at startup, after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

/// Installs a Prometheus recorder listening on the given address.
#[cfg(feature = "prometheus")]
pub fn install_prometheus(
    addr: std::net::SocketAddr,
) -> Result<(), metrics_exporter_prometheus::BuildError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    describe_metrics();
    Ok(())
}
