//! Index Octree

use crate::common::{classification_matches, SpatialEntry};
use lumen_core::base::*;
use lumen_core::geometry::{Bounds3f, Normal3f, Point3f};

/// Default split threshold for a leaf node.
const DEFAULT_MAX_ENTRIES_PER_NODE: usize = 64;

/// Default depth bound for the tree.
const DEFAULT_MAX_DEPTH: u32 = 24;

/// One octree node. Children are indices into the node arena; entry values
/// are indices into the caller-owned entry array.
#[derive(Clone, Debug, Default)]
struct OctreeNode {
    children: [Option<u32>; 8],
    entries: Vec<u32>,
    split: bool,
}

/// An octree over externally owned entries, supporting incremental insertion
/// while a clustering pass is running. An entry is stored in every leaf its
/// radius-expanded bounding box overlaps, so nearest-entry queries only have
/// to descend along the single chain of nodes containing the query point.
pub struct IndexOctree {
    nodes: Vec<OctreeNode>,
    world_bound: Bounds3f,
    entry_radius: Float,
    entry_radius2: Float,
    normal_cos_angle: Float,
    max_entries_per_node: usize,
    max_depth: u32,
}

impl IndexOctree {
    /// Create an empty octree.
    ///
    /// * `world_bound`      - Bounding box of the indexed region.
    /// * `entry_radius`     - Lookup radius shared by all entries.
    /// * `normal_angle_deg` - Maximum angle between matching surface normals.
    pub fn new(world_bound: Bounds3f, entry_radius: Float, normal_angle_deg: Float) -> Self {
        Self::with_limits(
            world_bound,
            entry_radius,
            normal_angle_deg,
            DEFAULT_MAX_ENTRIES_PER_NODE,
            DEFAULT_MAX_DEPTH,
        )
    }

    /// Create an empty octree with explicit node limits.
    ///
    /// * `world_bound`          - Bounding box of the indexed region.
    /// * `entry_radius`         - Lookup radius shared by all entries.
    /// * `normal_angle_deg`     - Maximum angle between matching surface normals.
    /// * `max_entries_per_node` - Split threshold for a leaf node.
    /// * `max_depth`            - Depth bound for the tree.
    pub fn with_limits(
        world_bound: Bounds3f,
        entry_radius: Float,
        normal_angle_deg: Float,
        max_entries_per_node: usize,
        max_depth: u32,
    ) -> Self {
        // Grow the root so entries on the boundary still land inside.
        let world_bound = world_bound.expand(entry_radius);
        Self {
            nodes: vec![OctreeNode::default()],
            world_bound,
            entry_radius,
            entry_radius2: entry_radius * entry_radius,
            normal_cos_angle: radians(normal_angle_deg).cos(),
            max_entries_per_node,
            max_depth,
        }
    }

    /// Insert an entry by index.
    ///
    /// * `entries` - The entry array.
    /// * `index`   - Index of the entry to insert.
    pub fn add<E: SpatialEntry>(&mut self, entries: &[E], index: usize) {
        let entry_bbox = Bounds3f::from_point(entries[index].position()).expand(self.entry_radius);
        self.add_rec(0, self.world_bound, entries, index as u32, &entry_bbox, 0);
    }

    fn add_rec<E: SpatialEntry>(
        &mut self,
        node_index: u32,
        node_bbox: Bounds3f,
        entries: &[E],
        entry_index: u32,
        entry_bbox: &Bounds3f,
        depth: u32,
    ) {
        if !self.nodes[node_index as usize].split {
            if depth == self.max_depth
                || self.nodes[node_index as usize].entries.len() < self.max_entries_per_node
            {
                self.nodes[node_index as usize].entries.push(entry_index);
                return;
            }

            // Split the full leaf and push its entries down.
            self.nodes[node_index as usize].split = true;
            let drained = std::mem::take(&mut self.nodes[node_index as usize].entries);
            for e in drained {
                let e_bbox =
                    Bounds3f::from_point(entries[e as usize].position()).expand(self.entry_radius);
                self.push_to_children(node_index, node_bbox, entries, e, &e_bbox, depth);
            }
        }

        self.push_to_children(node_index, node_bbox, entries, entry_index, entry_bbox, depth);
    }

    fn push_to_children<E: SpatialEntry>(
        &mut self,
        node_index: u32,
        node_bbox: Bounds3f,
        entries: &[E],
        entry_index: u32,
        entry_bbox: &Bounds3f,
        depth: u32,
    ) {
        let mid = node_bbox.centroid();
        for child in 0..8 {
            let child_bbox = child_node_bbox(child, &node_bbox, &mid);
            if !child_bbox.overlaps(entry_bbox) {
                continue;
            }
            let child_index = match self.nodes[node_index as usize].children[child] {
                Some(index) => index,
                None => {
                    let index = self.nodes.len() as u32;
                    self.nodes.push(OctreeNode::default());
                    self.nodes[node_index as usize].children[child] = Some(index);
                    index
                }
            };
            self.add_rec(child_index, child_bbox, entries, entry_index, entry_bbox, depth + 1);
        }
    }

    /// Returns the index of the nearest stored entry within the lookup
    /// radius matching the query classification.
    ///
    /// * `entries`   - The entry array.
    /// * `p`         - The query point.
    /// * `n`         - The query normal.
    /// * `is_volume` - The query volume flag.
    pub fn nearest_entry<E: SpatialEntry>(
        &self,
        entries: &[E],
        p: &Point3f,
        n: &Normal3f,
        is_volume: bool,
    ) -> Option<usize> {
        let (best, _) = self.nearest_rec(0, self.world_bound, entries, p, n, is_volume);
        best
    }

    // Side-effect-free search: returns the best match and its squared
    // distance within this subtree.
    fn nearest_rec<E: SpatialEntry>(
        &self,
        node_index: u32,
        node_bbox: Bounds3f,
        entries: &[E],
        p: &Point3f,
        n: &Normal3f,
        is_volume: bool,
    ) -> (Option<usize>, Float) {
        // Entries are looked up by point, not by range.
        if !node_bbox.contains(p) {
            return (None, self.entry_radius2);
        }

        let node = &self.nodes[node_index as usize];
        let mut best = None;
        let mut best_dist2 = self.entry_radius2;

        for &entry_index in &node.entries {
            let entry = &entries[entry_index as usize];
            let dist2 = p.distance_squared(&entry.position());
            if dist2 < best_dist2
                && classification_matches(&entry.normal(), entry.is_volume(), n, is_volume, self.normal_cos_angle)
            {
                best = Some(entry_index as usize);
                best_dist2 = dist2;
            }
        }

        let mid = node_bbox.centroid();
        for child in 0..8 {
            if let Some(child_index) = node.children[child] {
                let child_bbox = child_node_bbox(child, &node_bbox, &mid);
                let (child_best, child_dist2) =
                    self.nearest_rec(child_index, child_bbox, entries, p, n, is_volume);
                if child_best.is_some() && child_dist2 < best_dist2 {
                    best = child_best;
                    best_dist2 = child_dist2;
                }
            }
        }

        (best, best_dist2)
    }

    /// Returns the number of allocated nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Returns the bounding box of an octant. Bit 0 of `child` selects the x
/// half, bit 1 the y half, bit 2 the z half.
///
/// * `child`     - The octant index.
/// * `node_bbox` - The parent node bounds.
/// * `mid`       - The parent node center.
fn child_node_bbox(child: usize, node_bbox: &Bounds3f, mid: &Point3f) -> Bounds3f {
    let select = |bit: usize, low: Float, mid: Float, high: Float| -> (Float, Float) {
        if child & bit != 0 {
            (mid, high)
        } else {
            (low, mid)
        }
    };
    let (x0, x1) = select(1, node_bbox.p_min.x, mid.x, node_bbox.p_max.x);
    let (y0, y1) = select(2, node_bbox.p_min.y, mid.y, node_bbox.p_max.y);
    let (z0, z1) = select(4, node_bbox.p_min.z, mid.z, node_bbox.p_max.z);
    Bounds3f::new(Point3f::new(x0, y0, z0), Point3f::new(x1, y1, z1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::rng::Rng;
    use proptest::prelude::*;

    struct TestEntry {
        p: Point3f,
        n: Normal3f,
        is_volume: bool,
    }

    impl SpatialEntry for TestEntry {
        fn position(&self) -> Point3f {
            self.p
        }

        fn normal(&self) -> Normal3f {
            self.n
        }

        fn is_volume(&self) -> bool {
            self.is_volume
        }
    }

    fn surface_entry(x: Float, y: Float, z: Float) -> TestEntry {
        TestEntry {
            p: Point3f::new(x, y, z),
            n: Normal3f::new(0.0, 0.0, 1.0),
            is_volume: false,
        }
    }

    fn unit_bounds() -> Bounds3f {
        Bounds3f::new(Point3f::new(-1.0, -1.0, -1.0), Point3f::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn exact_position_query_finds_entry() {
        let entries = vec![surface_entry(0.25, 0.25, 0.25), surface_entry(-0.5, 0.0, 0.0)];
        let mut octree = IndexOctree::new(unit_bounds(), 0.1, 25.0);
        for i in 0..entries.len() {
            octree.add(&entries, i);
        }

        let up = Normal3f::new(0.0, 0.0, 1.0);
        assert_eq!(
            octree.nearest_entry(&entries, &Point3f::new(0.25, 0.25, 0.25), &up, false),
            Some(0)
        );
        assert_eq!(
            octree.nearest_entry(&entries, &Point3f::new(-0.5, 0.0, 0.0), &up, false),
            Some(1)
        );
    }

    #[test]
    fn volume_flag_mismatch_rejects_entry_at_distance_zero() {
        let entries = vec![surface_entry(0.0, 0.0, 0.0)];
        let mut octree = IndexOctree::new(unit_bounds(), 0.1, 25.0);
        octree.add(&entries, 0);

        let up = Normal3f::new(0.0, 0.0, 1.0);
        assert_eq!(octree.nearest_entry(&entries, &Point3f::ZERO, &up, true), None);
    }

    #[test]
    fn normal_cone_mismatch_rejects_surface_entry() {
        let entries = vec![surface_entry(0.0, 0.0, 0.0)];
        let mut octree = IndexOctree::new(unit_bounds(), 0.1, 25.0);
        octree.add(&entries, 0);

        let sideways = Normal3f::new(1.0, 0.0, 0.0);
        assert_eq!(octree.nearest_entry(&entries, &Point3f::ZERO, &sideways, false), None);
    }

    #[test]
    fn leaf_splits_once_over_capacity() {
        let mut entries = Vec::new();
        let mut rng = Rng::new(3);
        for _ in 0..64 {
            entries.push(surface_entry(
                rng.uniform_float() - 0.5,
                rng.uniform_float() - 0.5,
                rng.uniform_float() - 0.5,
            ));
        }
        let mut octree = IndexOctree::with_limits(unit_bounds(), 0.05, 25.0, 4, 16);
        for i in 0..entries.len() {
            octree.add(&entries, i);
        }
        assert!(octree.node_count() > 1);

        // Every entry stays findable after the splits.
        let up = Normal3f::new(0.0, 0.0, 1.0);
        for (i, e) in entries.iter().enumerate() {
            assert_eq!(octree.nearest_entry(&entries, &e.p, &up, false), Some(i));
        }
    }

    proptest! {
        #[test]
        fn matches_brute_force_nearest(seed in 0u64..256) {
            let mut rng = Rng::new(seed);
            let radius = 0.2_f32;
            let entries: Vec<TestEntry> = (0..32)
                .map(|_| surface_entry(
                    rng.uniform_float() * 2.0 - 1.0,
                    rng.uniform_float() * 2.0 - 1.0,
                    rng.uniform_float() * 2.0 - 1.0,
                ))
                .collect();
            let mut octree = IndexOctree::new(unit_bounds(), radius, 25.0);
            for i in 0..entries.len() {
                octree.add(&entries, i);
            }

            let up = Normal3f::new(0.0, 0.0, 1.0);
            let q = Point3f::new(
                rng.uniform_float() * 2.0 - 1.0,
                rng.uniform_float() * 2.0 - 1.0,
                rng.uniform_float() * 2.0 - 1.0,
            );

            let expected = entries
                .iter()
                .enumerate()
                .map(|(i, e)| (i, q.distance_squared(&e.p)))
                .filter(|&(_, d2)| d2 < radius * radius)
                .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
                .map(|(i, _)| i);

            prop_assert_eq!(octree.nearest_entry(&entries, &q, &up, false), expected);
        }
    }
}
