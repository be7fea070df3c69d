//! Driven port over the administrative region reference data.

use crate::domain::{Coordinate, Region};

/// Read-only access to provinces and regencies.
///
/// Implementations resolve missing regency coordinates from the parent
/// province so every returned [`Region`] can be used for a timings request.
pub trait RegionLookup: Send + Sync {
    /// Look up a regency by identifier.
    fn regency(&self, id: &str) -> Option<Region>;

    /// Look up a province by identifier.
    fn province(&self, id: &str) -> Option<Region>;

    /// Return the regency whose centroid is nearest to `coordinate`.
    fn nearest_regency(&self, coordinate: Coordinate) -> Option<Region>;
}
