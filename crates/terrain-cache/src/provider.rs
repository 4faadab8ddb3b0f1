//! The elevation oracle the resolver calls into.

use crate::geo::GeoPoint;
use std::sync::Arc;

/// Source of point elevations, called in bulk from the resolver thread.
///
/// The result must have one entry per input point, in the same order. `None`
/// marks a point the provider has no data for; a failure for one point must
/// not fail the batch. A cache calls its provider from one thread at a time.
pub trait ElevationProvider: Send + Sync {
    /// Resolve the elevation, in meters, of every point in `points`.
    fn resolve_batch(&self, points: &[GeoPoint]) -> Vec<Option<f64>>;
}

impl<F> ElevationProvider for F
where
    F: Fn(&[GeoPoint]) -> Vec<Option<f64>> + Send + Sync,
{
    fn resolve_batch(&self, points: &[GeoPoint]) -> Vec<Option<f64>> {
        self(points)
    }
}

impl<P: ElevationProvider + ?Sized> ElevationProvider for Arc<P> {
    fn resolve_batch(&self, points: &[GeoPoint]) -> Vec<Option<f64>> {
        (**self).resolve_batch(points)
    }
}
