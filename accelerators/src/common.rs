//! Common

use lumen_core::geometry::{Normal3f, Point3f};

/// An entry that can be stored in the spatial index structures. The
/// structures never own entries; they reference a caller-owned flat array by
/// integer index.
pub trait SpatialEntry {
    /// Returns the world position of the entry.
    fn position(&self) -> Point3f;

    /// Returns the surface normal of the entry. Ignored for volume entries.
    fn normal(&self) -> Normal3f;

    /// Returns `true` for an entry inside a participating medium.
    fn is_volume(&self) -> bool;
}

/// Returns `true` when a stored entry is a valid match for a query point
/// classification: volume flags must agree, and surface entries must lie
/// within the normal cone.
///
/// * `entry_n`          - The entry normal.
/// * `entry_is_volume`  - The entry volume flag.
/// * `query_n`          - The query normal.
/// * `query_is_volume`  - The query volume flag.
/// * `normal_cos_angle` - Minimum normal cosine for surface matches.
pub fn classification_matches(
    entry_n: &Normal3f,
    entry_is_volume: bool,
    query_n: &Normal3f,
    query_is_volume: bool,
    normal_cos_angle: f32,
) -> bool {
    if entry_is_volume != query_is_volume {
        return false;
    }
    entry_is_volume || query_n.dot(entry_n) >= normal_cos_angle
}
